use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use crate::debounce::TimerId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", content = "data")]
pub enum TimerOperation {
    /// Answer with `Fired` once `millis` have elapsed.
    Start { id: TimerId, millis: u64 },
    /// The native timer for `id` may be dropped. Answer with `Cleared`.
    Clear { id: TimerId },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimerOutput {
    Fired,
    Cleared,
}

impl Operation for TimerOperation {
    type Output = TimerOutput;
}

pub struct Timer<Ev> {
    context: CapabilityContext<TimerOperation, Ev>,
}

impl<Ev> Capability<Ev> for Timer<Ev> {
    type Operation = TimerOperation;
    type MappedSelf<MappedEv> = Timer<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Timer::new(self.context.map_event(f))
    }
}

impl<Ev> Timer<Ev>
where
    Ev: Send + 'static,
{
    pub fn new(context: CapabilityContext<TimerOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn start<F>(&self, id: TimerId, millis: u64, make_event: F)
    where
        F: FnOnce(TimerId) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx
                .request_from_shell(TimerOperation::Start { id, millis })
                .await;
            if output == TimerOutput::Fired {
                ctx.update_app(make_event(id));
            }
        });
    }

    /// Cancellation is logical; the core ignores a stale `Fired` anyway.
    pub fn clear(&self, id: TimerId) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.request_from_shell(TimerOperation::Clear { id }).await;
        });
    }
}
