use embassy_futures::select::{select, Either};
use embassy_sync::{blocking_mutex::raw::RawMutex, channel::Receiver};
use embassy_time::{Instant, Timer};

use super::ports::{FeedbackSignal, NetworkStack};
use super::{CommissioningNode, NodeInput, TimerSlots};
use crate::commissioning::RecordStore;

/// Drives the node forever: starts commissioning, then handles queued inputs
/// and timer deadlines in arrival order.
pub async fn run_commissioning_task<M, S, N, F, const CAP: usize>(
    node: &mut CommissioningNode<S, N, F, TimerSlots>,
    inputs: Receiver<'_, M, NodeInput, CAP>,
) -> !
where
    M: RawMutex,
    S: RecordStore,
    N: NetworkStack,
    F: FeedbackSignal,
{
    node.advance_to(Instant::now().as_millis());
    node.start();

    loop {
        let input = match node.timers().next_deadline() {
            Some(deadline_ms) => {
                match select(
                    inputs.receive(),
                    Timer::at(Instant::from_millis(deadline_ms)),
                )
                .await
                {
                    Either::First(input) => Some(input),
                    Either::Second(()) => None,
                }
            }
            None => Some(inputs.receive().await),
        };

        node.advance_to(Instant::now().as_millis());
        if let Some(input) = input {
            node.handle(input);
        }
    }
}
