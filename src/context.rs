//! Partitioning configuration.
//!
//! A [`Context`] bundles every knob of the pipeline and travels explicitly
//! through all stages; there is no global configuration state. Presets
//! configure the three supported trade-offs, an INI-style file or
//! [`Context::set_parameter`] override individual values.

use std::path::Path;

use crate::error::HypercutError;
use crate::partition::Objective;

/// Built-in configuration profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Reproducible: synchronous bucketed algorithms everywhere, output is
    /// a function of (input, seed, thread count).
    Deterministic,
    /// Default speed/quality trade-off.
    Speed,
    /// Adds flow-based refinement and more label-propagation rounds.
    HighQuality,
}

/// Top-level partitioning parameters.
#[derive(Debug, Clone)]
pub struct PartitionParams {
    pub k: u32,
    pub epsilon: f64,
    pub objective: Objective,
    pub seed: u64,
    pub num_vcycles: usize,
    pub verbose: bool,
}

/// Coarsening parameters.
#[derive(Debug, Clone)]
pub struct CoarseningParams {
    /// Stop once the hypergraph has at most `contraction_limit_multiplier · k` nodes.
    pub contraction_limit_multiplier: usize,
    /// Cap on cluster weight per level: `max_allowed_weight_fraction · W / (contraction limit)`.
    pub max_allowed_weight_multiplier: f64,
    /// Abort coarsening when a level shrinks by less than this factor.
    pub minimum_shrink_factor: f64,
    /// Use single reversible contractions instead of level boundaries.
    pub nlevel: bool,
}

/// Label-propagation refinement parameters.
#[derive(Debug, Clone)]
pub struct LabelPropagationParams {
    pub enabled: bool,
    pub maximum_iterations: usize,
}

/// FM refinement parameters.
#[derive(Debug, Clone)]
pub struct FmParams {
    pub enabled: bool,
    /// Border seeds handed to one localized search.
    pub num_seed_nodes: usize,
    /// Move budget of one localized search.
    pub max_moves_per_search: usize,
    /// Number of FM rounds per refinement invocation.
    pub num_rounds: usize,
    /// Tolerate overweight moves and rebalance afterwards.
    pub unconstrained: bool,
}

/// Flow refinement parameters.
#[derive(Debug, Clone)]
pub struct FlowParams {
    pub enabled: bool,
    /// Region size per block as a multiple of ε·W/k.
    pub region_scaling: f64,
    /// Pick the most balanced among the minimum cuts.
    pub most_balanced_cut: bool,
}

/// Initial-partitioning parameters.
#[derive(Debug, Clone)]
pub struct InitialPartitioningParams {
    /// Independent runs of each portfolio algorithm.
    pub runs_per_algorithm: usize,
    /// Re-seeded retry rounds before giving up on feasibility.
    pub retry_rounds: usize,
}

/// Preprocessing (community detection) parameters.
#[derive(Debug, Clone)]
pub struct PreprocessingParams {
    pub use_community_detection: bool,
    pub max_louvain_rounds: usize,
}

/// Execution-environment parameters.
#[derive(Debug, Clone)]
pub struct SharedParams {
    /// Worker threads; 0 = all available.
    pub num_threads: usize,
    /// Byte-identical outputs for fixed (input, seed, thread count).
    pub deterministic: bool,
    /// Per-level refinement deadline factor (of k · coarsening time).
    pub time_limit_factor: f64,
}

#[derive(Debug, Clone)]
pub struct Context {
    pub partition: PartitionParams,
    pub coarsening: CoarseningParams,
    pub label_propagation: LabelPropagationParams,
    pub fm: FmParams,
    pub flow: FlowParams,
    pub initial: InitialPartitioningParams,
    pub preprocessing: PreprocessingParams,
    pub shared: SharedParams,
}

impl Default for Context {
    fn default() -> Self {
        let mut ctx = Context {
            partition: PartitionParams {
                k: 2,
                epsilon: 0.03,
                objective: Objective::Km1,
                seed: 0,
                num_vcycles: 0,
                verbose: false,
            },
            coarsening: CoarseningParams {
                contraction_limit_multiplier: 160,
                max_allowed_weight_multiplier: 1.0,
                minimum_shrink_factor: 1.01,
                nlevel: false,
            },
            label_propagation: LabelPropagationParams {
                enabled: true,
                maximum_iterations: 5,
            },
            fm: FmParams {
                enabled: true,
                num_seed_nodes: 25,
                max_moves_per_search: 400,
                num_rounds: 3,
                unconstrained: false,
            },
            flow: FlowParams {
                enabled: false,
                region_scaling: 16.0,
                most_balanced_cut: true,
            },
            initial: InitialPartitioningParams {
                runs_per_algorithm: 2,
                retry_rounds: 5,
            },
            preprocessing: PreprocessingParams {
                use_community_detection: true,
                max_louvain_rounds: 5,
            },
            shared: SharedParams {
                num_threads: 0,
                deterministic: false,
                time_limit_factor: 0.25,
            },
        };
        ctx.load_preset(Preset::Speed);
        ctx
    }
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    pub fn load_preset(&mut self, preset: Preset) {
        match preset {
            Preset::Deterministic => {
                self.shared.deterministic = true;
                self.flow.enabled = false;
                self.fm.unconstrained = false;
                self.label_propagation.maximum_iterations = 5;
            }
            Preset::Speed => {
                self.shared.deterministic = false;
                self.flow.enabled = false;
                self.label_propagation.maximum_iterations = 5;
                self.fm.num_rounds = 3;
            }
            Preset::HighQuality => {
                self.shared.deterministic = false;
                self.flow.enabled = true;
                self.label_propagation.maximum_iterations = 10;
                self.fm.num_rounds = 5;
                self.fm.unconstrained = true;
            }
        }
    }

    /// Set one of the externally exposed parameters by name.
    /// Error kinds map to the stable codes 1 (unknown parameter),
    /// 2 (integer parse), 3 (invalid enum value).
    pub fn set_parameter(&mut self, name: &str, value: &str) -> Result<(), HypercutError> {
        match name {
            "NUM_BLOCKS" => {
                let k: u32 = value.parse().map_err(|_| HypercutError::IntParse {
                    name: "NUM_BLOCKS",
                    value: value.into(),
                })?;
                if k < 2 {
                    return Err(HypercutError::IntParse {
                        name: "NUM_BLOCKS",
                        value: value.into(),
                    });
                }
                self.partition.k = k;
            }
            "EPSILON" => {
                self.partition.epsilon =
                    value.parse().map_err(|_| HypercutError::IntParse {
                        name: "EPSILON",
                        value: value.into(),
                    })?;
            }
            "OBJECTIVE" => {
                self.partition.objective =
                    value.parse().map_err(|_| HypercutError::InvalidEnumValue {
                        name: "OBJECTIVE",
                        value: value.into(),
                    })?;
            }
            "SEED" => {
                self.partition.seed = value.parse().map_err(|_| HypercutError::IntParse {
                    name: "SEED",
                    value: value.into(),
                })?;
            }
            "NUM_VCYCLES" => {
                self.partition.num_vcycles =
                    value.parse().map_err(|_| HypercutError::IntParse {
                        name: "NUM_VCYCLES",
                        value: value.into(),
                    })?;
            }
            "VERBOSE" => {
                let flag: u32 = value.parse().map_err(|_| HypercutError::IntParse {
                    name: "VERBOSE",
                    value: value.into(),
                })?;
                self.partition.verbose = flag != 0;
            }
            _ => return Err(HypercutError::UnknownParameter(name.into())),
        }
        Ok(())
    }

    /// Load an INI-style configuration file. Keys are kebab-case, `#` and
    /// `;` start comments, `[section]` headers are accepted and ignored
    /// for lookup (keys are globally unique). Unknown keys fail loudly.
    pub fn configure_from_file(&mut self, path: &Path) -> Result<(), HypercutError> {
        let text = std::fs::read_to_string(path).map_err(|e| HypercutError::FileRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        // Parse into a staging copy so a bad file leaves `self` untouched.
        let mut staged = self.clone();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            let line_no = idx + 1;
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| HypercutError::MalformedConfigLine {
                    line: line_no,
                    content: line.into(),
                })?;
            staged.apply_config_key(key.trim(), value.trim(), line_no)?;
        }
        *self = staged;
        Ok(())
    }

    fn apply_config_key(
        &mut self,
        key: &str,
        value: &str,
        line: usize,
    ) -> Result<(), HypercutError> {
        let int = |v: &str| -> Result<usize, HypercutError> {
            v.parse().map_err(|_| HypercutError::MalformedConfigLine {
                line,
                content: format!("{key} = {value}"),
            })
        };
        let float = |v: &str| -> Result<f64, HypercutError> {
            v.parse().map_err(|_| HypercutError::MalformedConfigLine {
                line,
                content: format!("{key} = {value}"),
            })
        };
        let boolean = |v: &str| -> Result<bool, HypercutError> {
            match v {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(HypercutError::MalformedConfigLine {
                    line,
                    content: format!("{key} = {value}"),
                }),
            }
        };
        match key {
            "k" => self.partition.k = int(value)? as u32,
            "epsilon" => self.partition.epsilon = float(value)?,
            "objective" => {
                self.partition.objective =
                    value.parse().map_err(|_| HypercutError::InvalidEnumValue {
                        name: "objective",
                        value: value.into(),
                    })?
            }
            "seed" => self.partition.seed = int(value)? as u64,
            "num-vcycles" => self.partition.num_vcycles = int(value)?,
            "verbose" => self.partition.verbose = boolean(value)?,
            "deterministic" => self.shared.deterministic = boolean(value)?,
            "num-threads" => self.shared.num_threads = int(value)?,
            "time-limit-factor" => self.shared.time_limit_factor = float(value)?,
            "contraction-limit-multiplier" => {
                self.coarsening.contraction_limit_multiplier = int(value)?
            }
            "max-allowed-weight-multiplier" => {
                self.coarsening.max_allowed_weight_multiplier = float(value)?
            }
            "minimum-shrink-factor" => self.coarsening.minimum_shrink_factor = float(value)?,
            "nlevel" => self.coarsening.nlevel = boolean(value)?,
            "lp-enabled" => self.label_propagation.enabled = boolean(value)?,
            "lp-maximum-iterations" => self.label_propagation.maximum_iterations = int(value)?,
            "fm-enabled" => self.fm.enabled = boolean(value)?,
            "fm-seed-nodes" => self.fm.num_seed_nodes = int(value)?,
            "fm-max-moves" => self.fm.max_moves_per_search = int(value)?,
            "fm-rounds" => self.fm.num_rounds = int(value)?,
            "fm-unconstrained" => self.fm.unconstrained = boolean(value)?,
            "flow-enabled" => self.flow.enabled = boolean(value)?,
            "flow-region-scaling" => self.flow.region_scaling = float(value)?,
            "flow-most-balanced-cut" => self.flow.most_balanced_cut = boolean(value)?,
            "ip-runs" => self.initial.runs_per_algorithm = int(value)?,
            "ip-retry-rounds" => self.initial.retry_rounds = int(value)?,
            "community-detection" => self.preprocessing.use_community_detection = boolean(value)?,
            "louvain-rounds" => self.preprocessing.max_louvain_rounds = int(value)?,
            _ => {
                return Err(HypercutError::UnknownConfigKey {
                    key: key.into(),
                    line,
                })
            }
        }
        Ok(())
    }

    /// Validate the preconditions of `partition`.
    pub fn validate(&self) -> Result<(), HypercutError> {
        if self.partition.k < 2 {
            return Err(HypercutError::InvalidBlockCount(self.partition.k));
        }
        if !(self.partition.epsilon > 0.0) {
            return Err(HypercutError::InvalidEpsilon);
        }
        Ok(())
    }
}
