//! Structural validation of schedule trees.
//!
//! Block tasks impose ordering on their siblings, so a sibling list is
//! either made only of blocks (run in sequence) or contains none (run in
//! parallel). Mixing the two is rejected before anything executes.

use crate::schedule::types::{ScheduleTask, TaskKindTag};
use thiserror::Error;
use tracing::debug;

/// Structural errors in a schedule tree
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error(
        "Block tasks found amongst non-block tasks under '{parent}' ({blocks} block, {others} non-block). Block tasks must have block task siblings."
    )]
    MixedSiblings {
        /// Display name of the parent, or the schedule name for the root list
        parent: String,
        blocks: usize,
        others: usize,
    },
}

/// Check the sibling homogeneity rule over a whole tree.
///
/// Returns `false` if any sibling list, the root list included, mixes
/// block and non-block tasks.
pub fn validate(tasks: &[ScheduleTask]) -> bool {
    validate_block_siblings(tasks, "<root>").is_ok()
}

/// Depth-first homogeneity check reporting the first offending list.
pub fn validate_block_siblings(tasks: &[ScheduleTask], parent: &str) -> Result<(), ScheduleError> {
    let blocks = tasks
        .iter()
        .filter(|task| task.kind_tag() == TaskKindTag::Block)
        .count();
    let others = tasks.len() - blocks;

    if blocks > 0 && others > 0 {
        debug!(
            "Sibling list under '{}' mixes {} block and {} non-block tasks",
            parent, blocks, others
        );
        return Err(ScheduleError::MixedSiblings {
            parent: parent.to_string(),
            blocks,
            others,
        });
    }

    for task in tasks {
        validate_block_siblings(&task.children, &task.to_string())?;
    }

    Ok(())
}
