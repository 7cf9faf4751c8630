//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Energy data pipeline routines for household consumption."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Chooses between stored readings and synthesized samples.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{PipelineError, Result};
use crate::range::TimeRange;
use crate::sample::EnergySample;
use crate::store::TimeSeriesStore;
use crate::synth::Synthesizer;

/// Where a response's samples came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Synthetic,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Live => "live",
            DataSource::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Samples tagged with their origin.
#[derive(Debug, Clone)]
pub struct SourcedSamples {
    pub samples: Vec<EnergySample>,
    pub source: DataSource,
}

/// Serves sample series from the store, falling back to synthesis when allowed.
pub struct SampleSource {
    synthesizer: Synthesizer,
    store: Arc<dyn TimeSeriesStore>,
    fallback_to_synthetic: bool,
    rng: Mutex<StdRng>,
}

impl fmt::Debug for SampleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleSource")
            .field("devices", &self.synthesizer.devices().len())
            .field("fallback_to_synthetic", &self.fallback_to_synthetic)
            .finish()
    }
}

impl SampleSource {
    /// A `seed` makes synthesized output reproducible across runs.
    pub fn new(
        synthesizer: Synthesizer,
        store: Arc<dyn TimeSeriesStore>,
        fallback_to_synthetic: bool,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            synthesizer,
            store,
            fallback_to_synthetic,
            rng: Mutex::new(rng),
        }
    }

    pub fn store(&self) -> &Arc<dyn TimeSeriesStore> {
        &self.store
    }

    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }

    /// One synthesized batch stamped now.
    pub fn instant(&self) -> Vec<EnergySample> {
        let mut rng = self.rng.lock();
        self.synthesizer.generate_instant(&mut *rng)
    }

    pub fn synthetic_series(&self, range: TimeRange) -> Vec<EnergySample> {
        let mut rng = self.rng.lock();
        self.synthesizer.generate_series(range, &mut *rng)
    }

    pub fn synthetic_series_ending(
        &self,
        range: TimeRange,
        end: DateTime<Utc>,
    ) -> Vec<EnergySample> {
        let mut rng = self.rng.lock();
        self.synthesizer.generate_series_ending(range, end, &mut *rng)
    }

    /// Resolve a series for `range`.
    ///
    /// `Live` converts the store's readings at the range's default granularity;
    /// an empty result or a store failure is served synthetically only when
    /// fallback is enabled.
    pub async fn series(
        &self,
        user_id: &str,
        range: TimeRange,
        prefer: DataSource,
    ) -> Result<SourcedSamples> {
        if prefer == DataSource::Synthetic {
            return Ok(self.synthetic(range));
        }

        let outcome = self
            .store
            .query(user_id, range, None)
            .await
            .map(|readings| {
                readings
                    .into_iter()
                    .map(EnergySample::from)
                    .collect::<Vec<_>>()
            });
        match outcome {
            Ok(samples) if !samples.is_empty() => {
                debug!(user_id, range = %range, samples = samples.len(), "served live series");
                Ok(SourcedSamples {
                    samples,
                    source: DataSource::Live,
                })
            }
            Ok(_) if self.fallback_to_synthetic => {
                warn!(user_id, range = %range, "no stored samples; serving synthetic series");
                Ok(self.synthetic(range))
            }
            Ok(samples) => Ok(SourcedSamples {
                samples,
                source: DataSource::Live,
            }),
            Err(err) if self.fallback_to_synthetic => {
                warn!(user_id, range = %range, error = %err, "store query failed; serving synthetic series");
                Ok(self.synthetic(range))
            }
            Err(err) => Err(match err {
                PipelineError::StoreUnavailable(_) => err,
                other => PipelineError::StoreUnavailable(other.to_string()),
            }),
        }
    }

    fn synthetic(&self, range: TimeRange) -> SourcedSamples {
        SourcedSamples {
            samples: self.synthetic_series(range),
            source: DataSource::Synthetic,
        }
    }
}
