use crate::logger::Logger;
use crate::overlap::OverlapTracker;
use crate::record::DiskWrite;

/// A `(abs_index, DiskWrite)` pair. `abs_index` is the zero-based ordinal
/// of this op in the original trace, before splitting; both halves of a
/// split barrier intentionally share the same index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpochOp {
    pub abs_index: u64,
    pub op: DiskWrite,
}

/// A contiguous run of ops terminated by at most one barrier.
#[derive(Clone, Debug, Default)]
pub struct Epoch {
    pub ops: Vec<EpochOp>,
    pub has_barrier: bool,
    pub overlaps: bool,
    pub num_meta: u64,
    /// -1 before the first checkpoint is observed.
    pub checkpoint_epoch: i64,
}

impl Epoch {
    fn opening(checkpoint_epoch: i64) -> Self
    {
        Self {
            checkpoint_epoch,
            ..Self::default()
        }
    }
}

impl Default for EpochBuildState {
    fn default() -> Self
    {
        Self {
            epochs: Vec::new(),
            curr_checkpoint_epoch: -1,
            abs_index: 0,
        }
    }
}

struct EpochBuildState {
    epochs: Vec<Epoch>,
    curr_checkpoint_epoch: i64,
    abs_index: u64,
}

/// Consumes an ordered trace and yields epochs with barrier metadata,
/// checkpoint numbering, and per-epoch overlap flags.
///
/// Panics if a non-barrier op is ever reached where the loop expects a
/// barrier; that indicates a malformed trace, not a recoverable condition.
pub fn build_epochs(trace: &[DiskWrite]) -> Vec<Epoch>
{
    build_epochs_logged(trace, None)
}

pub fn build_epochs_logged(trace: &[DiskWrite], mut logger: Option<&mut Logger>) -> Vec<Epoch>
{
    let mut state = EpochBuildState::default();
    let mut current: Option<(Epoch, OverlapTracker)> = None;
    let mut i = 0usize;

    while i < trace.len() {
        if current.is_none() {
            current = Some((Epoch::opening(state.curr_checkpoint_epoch), OverlapTracker::new()));
        }

        let (epoch, tracker) = current.as_mut().unwrap();

        while i < trace.len() && !trace[i].is_barrier() {
            let op = &trace[i];

            if op.is_checkpoint() {
                state.curr_checkpoint_epoch += 1;
                epoch.checkpoint_epoch = state.curr_checkpoint_epoch;
                if let Some(l) = logger.as_deref_mut() {
                    l.log(2, &format!("checkpoint -> epoch {}", state.curr_checkpoint_epoch));
                }
                state.abs_index += 1;
                i += 1;
                continue;
            }

            if tracker.try_insert(op.write_sector, op.size) {
                epoch.overlaps = true;
                if let Some(l) = logger.as_deref_mut() {
                    l.log(2, &format!("overlap at sector {}", op.write_sector));
                }
            }

            epoch.num_meta += op.is_meta() as u64;
            epoch.ops.push(EpochOp {
                abs_index: state.abs_index,
                op: op.clone(),
            });
            state.abs_index += 1;
            i += 1;
        }

        if i >= trace.len() {
            break;
        }

        let op = trace[i].clone();
        assert!(op.is_barrier(), "TraceInvariantViolation: expected a barrier op at epoch boundary");

        let splits_for_data = op.is_write()
            && (op.has_flush_flag() || op.has_flush_seq_flag())
            && !op.has_fua_flag()
            && op.size > 0;

        if splits_for_data {
            let (flag_half, data_half) = op.split_for_barrier();

            epoch.num_meta += flag_half.is_meta() as u64;
            epoch.ops.push(EpochOp {
                abs_index: state.abs_index,
                op: flag_half,
            });
            epoch.has_barrier = true;

            if let Some(l) = logger.as_deref_mut() {
                l.log(
                    2,
                    &format!(
                        "barrier split at abs_index {} ({})",
                        state.abs_index,
                        op.describe_flags()
                    ),
                );
            }

            let (finished, _) = current.take().unwrap();
            state.epochs.push(finished);

            let mut next_tracker = OverlapTracker::new();
            next_tracker.try_insert(data_half.write_sector, data_half.size);

            let mut next_epoch = Epoch::opening(state.curr_checkpoint_epoch);
            next_epoch.num_meta += data_half.is_meta() as u64;
            next_epoch.ops.push(EpochOp {
                abs_index: state.abs_index,
                op: data_half,
            });

            current = Some((next_epoch, next_tracker));
            state.abs_index += 1;
            i += 1;
        } else {
            epoch.num_meta += op.is_meta() as u64;
            epoch.ops.push(EpochOp {
                abs_index: state.abs_index,
                op,
            });
            epoch.has_barrier = true;
            state.abs_index += 1;
            i += 1;

            let (finished, _) = current.take().unwrap();
            state.epochs.push(finished);
        }
    }

    if let Some((epoch, _)) = current {
        state.epochs.push(epoch);
    }

    state.epochs
}
