//! Trained-model loading and the (target, horizon) predictor registry.
//!
//! Models are opaque to the pipeline: a predictor maps one ordered feature
//! vector to one scalar forecast. The TorchScript backend loads an
//! artifact per (target, horizon) pair; the [`Predictor`] seam keeps the
//! registry and dispatch independent of the backend so tests can stub it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use parking_lot::{Mutex, RwLock};
use tch::{kind::Kind, CModule, Device, Tensor};

use crate::catalog::Catalog;
use crate::error::PredictError;

/// Opaque trained-model capability: one scalar forecast per feature vector.
pub trait Predictor: Send + Sync {
    fn predict(&self, features: &[f32]) -> Result<f64>;
}

/// TorchScript regressor taking a `[1, in_dim]` float input and producing
/// a single-element output.
pub struct TorchPredictor {
    module: CModule,
    device: Device,
    in_dim: usize,
}

impl TorchPredictor {
    pub fn load(path: &Path, in_dim: usize) -> Result<Self> {
        let device = Device::Cpu;
        let module = CModule::load_on_device(path, device)
            .with_context(|| format!("failed to load TorchScript {}", path.display()))?;

        // Probe with a dummy forward so shape mismatches fail at load
        // time rather than on the first request.
        let dummy = Tensor::zeros([1, in_dim as i64], (Kind::Float, device));
        let out = module.forward_ts(&[dummy])?;
        if out.numel() != 1 {
            bail!("unexpected model output size: {:?}", out.size());
        }

        Ok(Self {
            module,
            device,
            in_dim,
        })
    }
}

impl Predictor for TorchPredictor {
    fn predict(&self, features: &[f32]) -> Result<f64> {
        if features.len() != self.in_dim {
            bail!(
                "feature length mismatch: got {}, expected {}",
                features.len(),
                self.in_dim
            );
        }

        let input = Tensor::from_slice(features)
            .reshape([1, self.in_dim as i64])
            .to_device(self.device);
        let out = self.module.forward_ts(&[input])?;
        Ok(out.reshape([-1]).double_value(&[0]))
    }
}

/// Resolves a (target, horizon) key to a trained predictor.
///
/// `Ok(None)` means no artifact exists for the key; `Err` means an
/// artifact exists but could not be loaded.
pub trait ModelStore: Send + Sync {
    fn load(&self, target: &str, horizon_hours: u32) -> Result<Option<Arc<dyn Predictor>>>;
}

/// Directory of TorchScript artifacts named `{target}_{horizon}h.pt`.
pub struct TorchModelStore {
    models_dir: PathBuf,
    in_dims: HashMap<String, usize>,
}

impl TorchModelStore {
    pub fn new(models_dir: PathBuf, catalog: &Catalog) -> Self {
        let in_dims = catalog
            .targets()
            .filter_map(|name| {
                catalog
                    .get(name)
                    .ok()
                    .map(|spec| (name.to_string(), spec.features.len()))
            })
            .collect();
        Self {
            models_dir,
            in_dims,
        }
    }

    fn artifact_path(&self, target: &str, horizon_hours: u32) -> PathBuf {
        self.models_dir
            .join(format!("{target}_{horizon_hours}h.pt"))
    }
}

impl ModelStore for TorchModelStore {
    fn load(&self, target: &str, horizon_hours: u32) -> Result<Option<Arc<dyn Predictor>>> {
        let path = self.artifact_path(target, horizon_hours);
        if !path.exists() {
            return Ok(None);
        }
        let in_dim = *self
            .in_dims
            .get(target)
            .with_context(|| format!("no input width known for target '{target}'"))?;
        let predictor = TorchPredictor::load(&path, in_dim)?;
        tracing::info!(
            "loaded model for {} ({}h) from {}",
            target,
            horizon_hours,
            path.display()
        );
        Ok(Some(Arc::new(predictor)))
    }
}

pub type ModelKey = (String, u32);

/// Read-heavy map of loaded predictors, populated lazily.
///
/// Reads of an already-loaded key take the `RwLock` read path only. Loads
/// are serialized behind a single mutex with a re-check after acquisition:
/// at most one load runs per key, and concurrent requesters for the same
/// missing key wait for the winner and reuse its predictor. A failed or
/// absent load is not cached, so a later request retries idempotently.
pub struct Registry {
    store: Box<dyn ModelStore>,
    loaded: RwLock<HashMap<ModelKey, Arc<dyn Predictor>>>,
    load_lock: Mutex<()>,
}

impl Registry {
    pub fn new(store: Box<dyn ModelStore>) -> Self {
        Self {
            store,
            loaded: RwLock::new(HashMap::new()),
            load_lock: Mutex::new(()),
        }
    }

    pub fn resolve(
        &self,
        target: &str,
        horizon_hours: u32,
    ) -> Result<Arc<dyn Predictor>, PredictError> {
        let key: ModelKey = (target.to_string(), horizon_hours);
        if let Some(predictor) = self.loaded.read().get(&key) {
            return Ok(predictor.clone());
        }

        let _guard = self.load_lock.lock();
        if let Some(predictor) = self.loaded.read().get(&key) {
            return Ok(predictor.clone());
        }

        match self.store.load(target, horizon_hours) {
            Ok(Some(predictor)) => {
                self.loaded.write().insert(key, predictor.clone());
                Ok(predictor)
            }
            Ok(None) => Err(PredictError::ModelNotFound {
                target: target.to_string(),
                horizon_hours,
            }),
            Err(e) => Err(PredictError::ModelLoad {
                target: target.to_string(),
                horizon_hours,
                message: e.to_string(),
            }),
        }
    }

    /// Eagerly resolve every catalog pair, logging misses. Returns how
    /// many predictors are loaded afterwards.
    pub fn preload(&self, catalog: &Catalog) -> usize {
        let mut available = 0;
        for target in catalog.targets() {
            let horizons = match catalog.get(target) {
                Ok(spec) => spec.horizons.clone(),
                Err(_) => continue,
            };
            for horizon in horizons {
                match self.resolve(target, horizon) {
                    Ok(_) => available += 1,
                    Err(e) => tracing::warn!("{}", e),
                }
            }
        }
        available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ConstantPredictor(f64);

    impl Predictor for ConstantPredictor {
        fn predict(&self, _features: &[f32]) -> Result<f64> {
            Ok(self.0)
        }
    }

    struct StubStore {
        available: Vec<(&'static str, u32, f64)>,
        loads: Arc<AtomicUsize>,
    }

    impl StubStore {
        fn new(available: Vec<(&'static str, u32, f64)>) -> Self {
            Self {
                available,
                loads: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ModelStore for StubStore {
        fn load(&self, target: &str, horizon_hours: u32) -> Result<Option<Arc<dyn Predictor>>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .available
                .iter()
                .find(|(t, h, _)| *t == target && *h == horizon_hours)
                .map(|(_, _, v)| Arc::new(ConstantPredictor(*v)) as Arc<dyn Predictor>))
        }
    }

    #[test]
    fn resolve_loads_each_key_once() {
        let store = StubStore::new(vec![("pm2_5", 1, 12.0)]);
        let loads = store.loads.clone();
        let registry = Registry::new(Box::new(store));

        let first = registry.resolve("pm2_5", 1).unwrap();
        let second = registry.resolve("pm2_5", 1).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(first.predict(&[]).unwrap(), 12.0);
    }

    #[test]
    fn missing_key_maps_to_model_not_found() {
        let registry = Registry::new(Box::new(StubStore::new(vec![])));
        match registry.resolve("pm2_5", 72) {
            Err(PredictError::ModelNotFound {
                target,
                horizon_hours,
            }) => {
                assert_eq!(target, "pm2_5");
                assert_eq!(horizon_hours, 72);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn concurrent_resolution_stays_consistent() {
        let registry = Arc::new(Registry::new(Box::new(StubStore::new(vec![(
            "ozone", 24, 61.0,
        )]))));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.resolve("ozone", 24).unwrap().predict(&[]))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 61.0);
        }
    }

    #[test]
    fn preload_counts_only_available_models() {
        let catalog = Catalog::new().unwrap();
        let store = StubStore::new(vec![("pm2_5", 1, 10.0), ("pm10", 24, 30.0)]);
        let registry = Registry::new(Box::new(store));

        assert_eq!(registry.preload(&catalog), 2);
    }
}
