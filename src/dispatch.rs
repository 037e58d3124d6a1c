//! Fire-and-forget execution of controller writes.

use crate::controller::{Controller, ControllerCall};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct Dispatcher {
    controller: Arc<dyn Controller>,
}

impl Dispatcher {
    pub fn new(controller: Arc<dyn Controller>) -> Self {
        Self { controller }
    }

    /// Send each call produced by one entity command as its own task on the blocking pool.
    ///
    /// The calls are not transactional. A rejected call is logged and does not prevent the
    /// others from being applied. The returned handles may be dropped.
    pub fn dispatch(&self, entity: String, calls: Vec<ControllerCall>) -> Vec<JoinHandle<()>> {
        calls
            .into_iter()
            .map(|call| {
                let controller = Arc::clone(&self.controller);
                let entity = entity.clone();
                tokio::task::spawn_blocking(move || {
                    debug!(entity, ?call, "sending controller call");
                    if let Err(e) = call.apply(&*controller) {
                        warn!(entity, ?call, err = %e, "controller call failed");
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::fake::FakeController;
    use crate::controller::{CorrectionMode, RoomMode, SunblindCommand};

    fn room_mode(call: &ControllerCall) -> bool {
        matches!(call, ControllerCall::SetRoomMode { .. })
    }

    fn sunblind_command(call: &ControllerCall) -> bool {
        matches!(call, ControllerCall::SetSunblindCommand { .. })
    }

    async fn finish(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn every_call_is_applied() {
        let controller = Arc::new(FakeController::default());
        let dispatcher = Dispatcher::new(Arc::clone(&controller) as _);
        let calls = vec![
            ControllerCall::SetRoomMode { room: "r1".into(), mode: RoomMode::Calendar },
            ControllerCall::SetCalendar { room: "r1".into(), calendar: 2 },
        ];
        let handles = dispatcher.dispatch("iqtec-r1".into(), calls.clone());
        assert_eq!(handles.len(), 2);
        finish(handles).await;
        let recorded = controller.recorded();
        assert_eq!(recorded.len(), 2);
        assert!(calls.iter().all(|c| recorded.contains(c)));
    }

    #[tokio::test]
    async fn rejected_call_does_not_block_the_others() {
        let controller = Arc::new(FakeController::default());
        *controller.rejects.lock().unwrap() = Some(room_mode);
        let dispatcher = Dispatcher::new(Arc::clone(&controller) as _);
        let calls = vec![
            ControllerCall::SetRoomMode { room: "r1".into(), mode: RoomMode::Calendar },
            ControllerCall::SetCorrectionMode { room: "r1".into(), mode: CorrectionMode::Manual },
        ];
        finish(dispatcher.dispatch("iqtec-r1".into(), calls.clone())).await;
        assert_eq!(controller.recorded(), calls[1..]);
    }

    #[tokio::test]
    async fn sunblind_calls_are_independent() {
        let controller = Arc::new(FakeController::default());
        *controller.rejects.lock().unwrap() = Some(sunblind_command);
        let dispatcher = Dispatcher::new(Arc::clone(&controller) as _);
        let calls = vec![
            ControllerCall::SetSunblindCommand {
                sunblind: "r1_1".into(),
                command: SunblindCommand::Up,
            },
            ControllerCall::SetSunblindRotation { sunblind: "r1_1".into(), rotation: 0 },
        ];
        finish(dispatcher.dispatch("iqtec-r1_1".into(), calls.clone())).await;
        assert_eq!(controller.recorded(), calls[1..]);
    }
}
