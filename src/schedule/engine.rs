use std::collections::HashMap;

use log::{debug, info};
use poise::serenity_prelude::{GuildId, UserId};

use super::{
    parse::Parser, store::ScheduleStore, Block, BlockId, Role, ScheduleError, ValidationError,
};

/// How a batch of edits reacts to an invalid member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// The first invalid edit aborts the batch; nothing is written.
    Atomic,
    /// Invalid edits are reported, the valid ones are applied and written.
    BestEffort,
}

/// A single change to the schedule.
#[derive(Debug, Clone)]
enum Edit {
    /// Finds or creates the `(start, end)` block of `team`, then assigns.
    Upsert {
        team: GuildId,
        start: i64,
        end: i64,
        assignments: Vec<(Role, UserId)>,
    },
    /// Moves an existing block to a new range.
    Retarget { id: BlockId, start: i64, end: i64 },
    /// Sets roles on an existing block. Roles not listed stay untouched.
    Assign {
        id: BlockId,
        assignments: Vec<(Role, UserId)>,
    },
}

/// Result of a committed batch.
#[derive(Debug, Default)]
struct Commit {
    /// Blocks touched by the valid edits, in edit order.
    touched: Vec<Block>,
    /// Edits rejected under the best effort policy.
    errors: Vec<ValidationError>,
}

/// Outcome of a multi assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub block: Block,
    pub applied: Vec<(Role, UserId)>,
}

/// Fields submitted through the edit form for one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    /// New `start-end` range.
    pub range: String,
    /// Assignments in the `alias=@user` syntax. Roles not listed keep their scout.
    pub assignments: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DeleteTarget {
    Block { start: i64, end: i64 },
    All,
}

/// A deletion waiting for the user's confirmation.
/// It can only be built by [`Engine::propose_delete_block`] or
/// [`Engine::propose_delete_all`] and is consumed by [`Engine::confirm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    team: GuildId,
    target: DeleteTarget,
}

impl PendingDelete {
    /// The `(start, end)` range when a single block is targeted.
    pub fn range(&self) -> Option<(i64, i64)> {
        match self.target {
            DeleteTarget::Block { start, end } => Some((start, end)),
            DeleteTarget::All => None,
        }
    }
}

/// Translates commands and form submissions into schedule changes.
///
/// Blocks are identified by their id. The `(start, end, team)` triple
/// is only used to find the target of a command typed by a user.
#[derive(Debug, Clone)]
pub struct Engine {
    store: ScheduleStore,
    parser: Parser,
}

impl Engine {
    pub fn new(store: ScheduleStore, parser: Parser) -> Self {
        Self { store, parser }
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    /// Every block of every team, in document order.
    pub fn all_blocks(&self) -> Vec<Block> {
        self.store.load()
    }

    /// The blocks of `team`, sorted by their first match.
    pub fn blocks(&self, team: GuildId) -> Vec<Block> {
        let mut blocks: Vec<Block> = self
            .store
            .load()
            .into_iter()
            .filter(|block| block.team == team)
            .collect();
        blocks.sort_by_key(|block| (block.start, block.end));
        blocks
    }

    pub fn block(&self, team: GuildId, id: &BlockId) -> Option<Block> {
        self.store
            .load()
            .into_iter()
            .find(|block| block.team == team && &block.id == id)
    }

    /// `/schedule assign 1-10 blue_1 @user`
    pub fn assign_one(
        &self,
        team: GuildId,
        range: &str,
        role: &str,
        mention: &str,
    ) -> Result<Block, ScheduleError> {
        let (start, end) = self.parser.range(range)?;
        let role: Role = role.parse()?;
        let user = self.parser.mention(mention)?;

        let commit = self.commit(ValidationPolicy::Atomic, |_| {
            vec![Ok(Edit::Upsert {
                team,
                start,
                end,
                assignments: vec![(role, user)],
            })]
        })?;

        info!("assigned {} to {} for {}-{} in {}", user, role, start, end, team);
        single(commit)
    }

    /// `/schedule block-assign block=10-20 blue_1=@a red_2=@b`
    pub fn assign_many(&self, team: GuildId, text: &str) -> Result<Assignment, ScheduleError> {
        let parsed = self.parser.block_assignment(text)?;
        let applied = parsed.assignments.clone();

        let commit = self.commit(ValidationPolicy::Atomic, |_| {
            vec![Ok(Edit::Upsert {
                team,
                start: parsed.start,
                end: parsed.end,
                assignments: parsed.assignments,
            })]
        })?;

        info!(
            "assigned {} roles for {}-{} in {}",
            applied.len(),
            parsed.start,
            parsed.end,
            team
        );
        Ok(Assignment {
            block: single(commit)?,
            applied,
        })
    }

    /// Appends an empty block right after the last starting block of `team`.
    pub fn add_block(&self, team: GuildId) -> Result<Block, ScheduleError> {
        let commit = self.commit(ValidationPolicy::Atomic, |blocks| {
            let last = blocks
                .iter()
                .filter(|block| block.team == team)
                .map(|block| block.start)
                .max();
            let start = match last {
                None => 1,
                Some(last) => match last.checked_add(1) {
                    Some(start) => start,
                    None => return vec![Err(ValidationError::NoFollowingMatch(last))],
                },
            };

            vec![Ok(Edit::Upsert {
                team,
                start,
                end: start,
                assignments: Vec::new(),
            })]
        })?;

        single(commit)
    }

    /// Applies the edit form to every block of `team` present in `fields`.
    ///
    /// A block with an invalid range keeps its stored range but still
    /// receives its assignments. Errors of all blocks are returned together,
    /// and the schedule is written once whatever failed.
    pub fn reconcile_form(
        &self,
        team: GuildId,
        fields: &HashMap<BlockId, FormFields>,
    ) -> Result<Vec<ValidationError>, ScheduleError> {
        let parser = &self.parser;
        let commit = self.commit(ValidationPolicy::BestEffort, |blocks| {
            let mut edits = Vec::new();

            for block in blocks.iter().filter(|block| block.team == team) {
                let Some(form) = fields.get(&block.id) else {
                    continue;
                };

                edits.push(parser.form_range(&form.range).map(|(start, end)| Edit::Retarget {
                    id: block.id.clone(),
                    start,
                    end,
                }));

                edits.push(parser.role_tokens(&form.assignments).map(|assignments| {
                    Edit::Assign {
                        id: block.id.clone(),
                        assignments,
                    }
                }));
            }

            edits
        })?;

        debug!(
            "form of {} saved: {} edits applied, {} rejected",
            team,
            commit.touched.len(),
            commit.errors.len()
        );
        Ok(commit.errors)
    }

    /// First step of a single block deletion. Nothing is removed yet.
    pub fn propose_delete_block(&self, team: GuildId, start: i64, end: i64) -> PendingDelete {
        PendingDelete {
            team,
            target: DeleteTarget::Block { start, end },
        }
    }

    /// First step of a whole schedule deletion. Nothing is removed yet.
    pub fn propose_delete_all(&self, team: GuildId) -> PendingDelete {
        PendingDelete {
            team,
            target: DeleteTarget::All,
        }
    }

    /// Second step of a deletion: removes the targeted blocks.
    /// Returns the amount of removed blocks.
    pub fn confirm(&self, pending: PendingDelete) -> Result<usize, ScheduleError> {
        let mut blocks = self.store.load();
        let before = blocks.len();
        let team = pending.team;

        match pending.target {
            DeleteTarget::Block { start, end } => {
                blocks.retain(|block| !block.is_range(team, start, end));
                if blocks.len() == before {
                    return Err(ScheduleError::NotFound { start, end });
                }
            }
            DeleteTarget::All => blocks.retain(|block| block.team != team),
        }

        self.store.save(&blocks)?;
        let removed = before - blocks.len();
        info!("removed {} blocks of {}", removed, team);

        Ok(removed)
    }

    /// Loads the schedule, applies the planned edits under `policy` and
    /// writes the result back.
    fn commit<F>(&self, policy: ValidationPolicy, plan: F) -> Result<Commit, ScheduleError>
    where
        F: FnOnce(&[Block]) -> Vec<Result<Edit, ValidationError>>,
    {
        let mut blocks = self.store.load();
        let edits = plan(&blocks);
        let mut commit = Commit::default();

        for edit in edits {
            match edit.and_then(|edit| apply(&mut blocks, edit)) {
                Ok(index) => commit.touched.push(blocks[index].clone()),
                Err(err) => match policy {
                    // the in memory copy is dropped, the document stays untouched
                    ValidationPolicy::Atomic => return Err(err.into()),
                    ValidationPolicy::BestEffort => commit.errors.push(err),
                },
            }
        }

        self.store.save(&blocks)?;
        Ok(commit)
    }
}

/// Applies one edit and returns the index of the touched block.
fn apply(blocks: &mut Vec<Block>, edit: Edit) -> Result<usize, ValidationError> {
    match edit {
        Edit::Upsert {
            team,
            start,
            end,
            assignments,
        } => {
            if start > end {
                return Err(ValidationError::OutOfOrder { start, end });
            }

            let index = match blocks.iter().position(|block| block.is_range(team, start, end)) {
                Some(index) => index,
                None => {
                    blocks.push(Block::new(team, start, end));
                    blocks.len() - 1
                }
            };
            blocks[index].assignments.extend(assignments);

            Ok(index)
        }
        Edit::Retarget { id, start, end } => {
            if start > end {
                return Err(ValidationError::OutOfOrder { start, end });
            }

            let index = position(blocks, &id)?;
            let team = blocks[index].team;
            if blocks
                .iter()
                .any(|block| block.id != id && block.is_range(team, start, end))
            {
                return Err(ValidationError::RangeCollision { start, end });
            }

            blocks[index].start = start;
            blocks[index].end = end;

            Ok(index)
        }
        Edit::Assign { id, assignments } => {
            let index = position(blocks, &id)?;
            blocks[index].assignments.extend(assignments);

            Ok(index)
        }
    }
}

fn position(blocks: &[Block], id: &BlockId) -> Result<usize, ValidationError> {
    blocks
        .iter()
        .position(|block| &block.id == id)
        .ok_or_else(|| ValidationError::UnknownBlock(id.to_string()))
}

fn single(commit: Commit) -> Result<Block, ScheduleError> {
    commit
        .touched
        .into_iter()
        .next()
        .ok_or_else(|| ScheduleError::Persistence(anyhow::anyhow!("no block was touched")))
}
