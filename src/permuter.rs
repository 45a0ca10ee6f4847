use std::collections::HashSet;

use crate::epoch::{build_epochs_logged, Epoch, EpochOp};
use crate::logger::Logger;
use crate::record::DiskWrite;

pub const MIN_RETRIES: u64 = 1000;
pub const RETRY_MULTIPLIER: u64 = 2;

/// Ordered sequence of `abs_index` values identifying a crash state for
/// deduplication. Two states are equal iff their signatures are equal.
pub type CrashStateSignature = Vec<u64>;

/// Opaque, strategy-owned scratch record. The driver passes it through to
/// the strategy on every call and never inspects its contents.
#[derive(Debug, Default, Clone)]
pub struct PermuteLog {
    pub entries: Vec<String>,
}

/// Given the epochs built from a trace, produces one candidate crash state
/// plus a flag saying whether the strategy's space is believed exhausted
/// (`false`). Diversity across calls is the strategy's own responsibility.
pub trait PermuteStrategy {
    fn gen_one_state(&mut self, epochs: &[Epoch], log: &mut PermuteLog) -> (Vec<EpochOp>, bool);
}

#[derive(Clone, Copy, Debug)]
pub struct PermuterConfig {
    pub retry_multiplier: u64,
    pub min_retries: u64,
    pub verbosity: u32,
}

impl Default for PermuterConfig {
    fn default() -> Self
    {
        Self {
            retry_multiplier: RETRY_MULTIPLIER,
            min_retries: MIN_RETRIES,
            verbosity: 0,
        }
    }
}

/// Owns the epochs built from the most recently loaded trace and the set
/// of previously emitted crash-state signatures.
pub struct Permuter {
    epochs: Vec<Epoch>,
    completed: HashSet<CrashStateSignature>,
    config: PermuterConfig,
    logger: Option<Logger>,
}

impl Permuter {
    pub fn new() -> Self
    {
        Self {
            epochs: Vec::new(),
            completed: HashSet::new(),
            config: PermuterConfig::default(),
            logger: None,
        }
    }

    pub fn with_config(config: PermuterConfig) -> Self
    {
        Self {
            config,
            ..Self::new()
        }
    }

    pub fn with_logger(logger: Logger) -> Self
    {
        Self {
            logger: Some(logger),
            ..Self::new()
        }
    }

    /// Rebuilds epoch state from `trace`. Clears the previously built
    /// epochs, but not the deduplication set.
    pub fn init_data(&mut self, trace: &[DiskWrite])
    {
        self.epochs = build_epochs_logged(trace, self.logger.as_mut());
    }

    pub fn epochs(&self) -> &[Epoch]
    {
        &self.epochs
    }

    /// Drives `strategy` until it produces a crash state whose signature
    /// has not been seen before, or until the retry budget is exhausted.
    /// The retry budget grows with the number of previously discovered
    /// states, so the driver works harder as the space saturates but never
    /// spins unboundedly once the strategy signals exhaustion.
    pub fn generate_crash_state(
        &mut self,
        strategy: &mut dyn PermuteStrategy,
        log: &mut PermuteLog,
    ) -> (Vec<DiskWrite>, bool)
    {
        let max_retries = std::cmp::max(
            self.config.min_retries,
            self.config.retry_multiplier * self.completed.len() as u64,
        );

        let mut retries: u64 = 0;
        let mut new_state = true;
        let mut candidate: Vec<EpochOp> = Vec::new();
        let mut signature: CrashStateSignature = Vec::new();
        let mut exists = false;

        loop {
            let (c, ns) = strategy.gen_one_state(&self.epochs, log);
            candidate = c;
            new_state = ns;
            signature = candidate.iter().map(|op| op.abs_index).collect();

            retries += 1;
            exists = self.completed.contains(&signature);

            if !new_state || retries >= max_retries {
                break;
            }
            if !exists {
                break;
            }
        }

        if let Some(l) = self.logger.as_mut() {
            l.log(1, &format!("generate_crash_state: {retries} retries, fresh={}", !exists));
        }

        let result: Vec<DiskWrite> = candidate.into_iter().map(|op| op.op).collect();

        if !exists {
            self.completed.insert(signature);
            (result, new_state)
        } else {
            (result, false)
        }
    }
}

impl Default for Permuter {
    fn default() -> Self
    {
        Self::new()
    }
}
