//! Drag gesture adapter.
//!
//! # Responsibility
//! - Track one in-flight drag gesture from the host: dragged block, currently
//!   hovered target and before/after intent.
//! - On release, freeze the last intent and issue exactly one move.
//!
//! # Invariants
//! - Nothing is written to the store while dragging.
//! - Cancel, or release without a target, performs no store mutation.
//! - Gesture state is discarded on every return to `Idle`.

use crate::estimate::LengthEstimator;
use crate::model::block::{BlockId, Zone};
use crate::model::intent::{MoveIntent, MoveTarget};
use crate::repo::block_repo::BlockStore;
use crate::service::block_service::BlockService;
use crate::service::move_coordinator::{MoveError, MoveOutcome};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Executes a frozen move intent.
pub trait MoveExecutor {
    fn execute_move(&self, intent: &MoveIntent) -> Result<MoveOutcome, MoveError>;
}

impl<S: BlockStore, E: LengthEstimator> MoveExecutor for BlockService<S, E> {
    fn execute_move(&self, intent: &MoveIntent) -> Result<MoveOutcome, MoveError> {
        self.move_block(intent.block_id, intent.destination, intent.target)
    }
}

/// What the pointer is over, as reported by the gesture host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverTarget {
    /// Over a block; `insert_before` is the host's before/after split.
    Block {
        zone: Zone,
        block_id: BlockId,
        insert_before: bool,
    },
    /// Over a zone's empty area, meaning "append".
    ZoneEnd(Zone),
}

impl HoverTarget {
    fn to_intent(self, block_id: BlockId) -> MoveIntent {
        match self {
            Self::Block {
                zone,
                block_id: target,
                insert_before,
            } => MoveIntent {
                block_id,
                destination: zone,
                target: MoveTarget::Relative {
                    target,
                    insert_before,
                },
            },
            Self::ZoneEnd(zone) => MoveIntent {
                block_id,
                destination: zone,
                target: MoveTarget::End,
            },
        }
    }
}

/// In-flight gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragSession {
    pub block_id: BlockId,
    /// Zone the host reported at drag start. Used for logging only.
    pub source_zone: Zone,
    pub hover: Option<HoverTarget>,
}

/// Gesture state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(DragSession),
    /// Intent frozen at release, move in progress.
    Resolving(MoveIntent),
}

/// Errors from drag transitions.
#[derive(Debug)]
pub enum DragError {
    /// `begin` called while a gesture is already active.
    AlreadyDragging,
    /// Gesture event received while idle.
    NotDragging,
    /// The frozen intent failed to apply.
    Move(MoveError),
}

impl Display for DragError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyDragging => write!(f, "a drag gesture is already in progress"),
            Self::NotDragging => write!(f, "no drag gesture in progress"),
            Self::Move(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DragError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Move(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MoveError> for DragError {
    fn from(value: MoveError) -> Self {
        Self::Move(value)
    }
}

/// Converts one host drag gesture into at most one move.
#[derive(Debug, Default)]
pub struct DragInteractionAdapter {
    state: DragState,
}

impl DragInteractionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    /// Starts dragging `block_id` out of `source_zone`.
    ///
    /// `source_zone` is not checked against the store. The move resolves the
    /// block's committed zone when the intent is executed.
    pub fn begin(&mut self, block_id: BlockId, source_zone: Zone) -> Result<(), DragError> {
        if !matches!(self.state, DragState::Idle) {
            return Err(DragError::AlreadyDragging);
        }
        self.state = DragState::Dragging(DragSession {
            block_id,
            source_zone,
            hover: None,
        });
        Ok(())
    }

    /// Records the latest hovered target; `None` means outside any target.
    pub fn hover(&mut self, target: Option<HoverTarget>) -> Result<(), DragError> {
        match &mut self.state {
            DragState::Dragging(session) => {
                session.hover = target;
                Ok(())
            }
            _ => Err(DragError::NotDragging),
        }
    }

    /// Ends the gesture without touching the store.
    pub fn cancel(&mut self) {
        if let DragState::Dragging(session) = self.state {
            info!(
                "event=drag_cancel module=drag status=ok block={}",
                session.block_id
            );
        }
        self.state = DragState::Idle;
    }

    /// Freezes the last hovered intent and issues it.
    ///
    /// Returns `Ok(None)` when released outside any target.
    pub fn release(
        &mut self,
        executor: &impl MoveExecutor,
    ) -> Result<Option<MoveOutcome>, DragError> {
        let session = match self.state {
            DragState::Dragging(session) => session,
            _ => return Err(DragError::NotDragging),
        };

        let Some(hover) = session.hover else {
            self.cancel();
            return Ok(None);
        };

        let intent = hover.to_intent(session.block_id);
        self.state = DragState::Resolving(intent);
        let result = executor.execute_move(&intent);
        self.state = DragState::Idle;

        info!(
            "event=drag_release module=drag status={} block={} from={} to={}",
            if result.is_ok() { "ok" } else { "error" },
            session.block_id,
            session.source_zone,
            intent.destination
        );
        result.map(Some).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::{DragError, DragInteractionAdapter, DragState, HoverTarget, MoveExecutor};
    use crate::model::block::{Block, BlockKind, Zone};
    use crate::model::intent::{MoveIntent, MoveTarget};
    use crate::service::move_coordinator::{MoveError, MoveOutcome};
    use std::cell::RefCell;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingExecutor {
        intents: RefCell<Vec<MoveIntent>>,
    }

    impl MoveExecutor for RecordingExecutor {
        fn execute_move(&self, intent: &MoveIntent) -> Result<MoveOutcome, MoveError> {
            self.intents.borrow_mut().push(*intent);
            Ok(MoveOutcome {
                block: Block {
                    id: intent.block_id,
                    ..Block::new(intent.destination, 1.0, BlockKind::Text, "", 0)
                },
                renormalized: false,
                attempts: 1,
                utilization: Vec::new(),
            })
        }
    }

    #[test]
    fn only_the_last_hover_is_issued_on_release() {
        let executor = RecordingExecutor::default();
        let mut adapter = DragInteractionAdapter::new();
        let dragged = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        adapter.begin(dragged, Zone::Stable).unwrap();
        adapter
            .hover(Some(HoverTarget::Block {
                zone: Zone::Working,
                block_id: first,
                insert_before: false,
            }))
            .unwrap();
        adapter
            .hover(Some(HoverTarget::Block {
                zone: Zone::Working,
                block_id: second,
                insert_before: true,
            }))
            .unwrap();
        assert!(executor.intents.borrow().is_empty());

        let outcome = adapter.release(&executor).unwrap();
        assert!(outcome.is_some());
        assert_eq!(
            executor.intents.borrow().as_slice(),
            &[MoveIntent {
                block_id: dragged,
                destination: Zone::Working,
                target: MoveTarget::before(second),
            }]
        );
        assert_eq!(adapter.state(), &DragState::Idle);
    }

    #[test]
    fn release_outside_targets_and_cancel_issue_nothing() {
        let executor = RecordingExecutor::default();
        let mut adapter = DragInteractionAdapter::new();

        adapter.begin(Uuid::new_v4(), Zone::Working).unwrap();
        adapter.hover(Some(HoverTarget::ZoneEnd(Zone::Stable))).unwrap();
        adapter.hover(None).unwrap();
        assert!(adapter.release(&executor).unwrap().is_none());

        adapter.begin(Uuid::new_v4(), Zone::Working).unwrap();
        adapter.hover(Some(HoverTarget::ZoneEnd(Zone::Stable))).unwrap();
        adapter.cancel();

        assert!(executor.intents.borrow().is_empty());
        assert_eq!(adapter.state(), &DragState::Idle);
    }

    #[test]
    fn transitions_are_guarded() {
        let executor = RecordingExecutor::default();
        let mut adapter = DragInteractionAdapter::new();

        assert!(matches!(
            adapter.hover(Some(HoverTarget::ZoneEnd(Zone::Working))),
            Err(DragError::NotDragging)
        ));
        assert!(matches!(
            adapter.release(&executor),
            Err(DragError::NotDragging)
        ));

        adapter.begin(Uuid::new_v4(), Zone::Working).unwrap();
        assert!(matches!(
            adapter.begin(Uuid::new_v4(), Zone::Working),
            Err(DragError::AlreadyDragging)
        ));
    }
}
