//! The bonded-force module and its lifecycle.

use std::sync::Arc;

use bonded_gpu::ComputeBackend;
use tracing::debug;

use crate::config::BondedConfig;
use crate::context::SharedAccumulators;
use crate::dispatch::{self, ReadyKernel};
use crate::error::{BondedError, Result};
use crate::pipeline::{self, BuiltKernel, KernelSummary};
use crate::registry::Registry;

/// Where a [`BondedForces`] is in its build-once, dispatch-many life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Accepting terms, arguments and prefix code.
    Uninitialized,
    /// Kernel compiled and index buffers uploaded; arguments not yet bound.
    Built,
    /// Arguments bound; dispatch allowed.
    Ready,
    /// A build or bind failed; the registrations are gone.
    Failed,
}

enum Stage<B: ComputeBackend> {
    Uninitialized(Registry<B::Buffer>),
    Built(BuiltKernel<B>),
    Ready(ReadyKernel<B>),
    Failed,
}

impl<B: ComputeBackend> Stage<B> {
    fn state(&self) -> LifecycleState {
        match self {
            Stage::Uninitialized(_) => LifecycleState::Uninitialized,
            Stage::Built(_) => LifecycleState::Built,
            Stage::Ready(_) => LifecycleState::Ready,
            Stage::Failed => LifecycleState::Failed,
        }
    }
}

/// Fuses every registered bonded term into one kernel and launches it.
///
/// ```text
/// Uninitialized --build--> Built --prepare--> Ready --dispatch--> Ready
///       \                    \
///        `-- build error -----`-- bind error --> Failed
/// ```
pub struct BondedForces<B: ComputeBackend> {
    backend: Arc<B>,
    accumulators: SharedAccumulators<B>,
    config: BondedConfig,
    stage: Stage<B>,
}

impl<B: ComputeBackend> BondedForces<B> {
    pub fn new(
        backend: Arc<B>,
        accumulators: SharedAccumulators<B>,
        config: BondedConfig,
    ) -> Result<Self> {
        config.validate()?;
        let registry = Registry::new(accumulators.num_atoms);
        Ok(Self {
            backend,
            accumulators,
            config,
            stage: Stage::Uninitialized(registry),
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.stage.state()
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn accumulators(&self) -> &SharedAccumulators<B> {
        &self.accumulators
    }

    pub fn config(&self) -> &BondedConfig {
        &self.config
    }

    fn invalid(&self, operation: &'static str) -> BondedError {
        BondedError::InvalidState {
            operation,
            state: self.state(),
        }
    }

    fn registry_mut(&mut self, operation: &'static str) -> Result<&mut Registry<B::Buffer>> {
        let state = self.state();
        match &mut self.stage {
            Stage::Uninitialized(registry) => Ok(registry),
            _ => Err(BondedError::InvalidState { operation, state }),
        }
    }

    /// Register a force term over `tuples` in `group`.
    ///
    /// `expression` is spliced verbatim into the term's loop body. An empty
    /// `tuples` list registers nothing.
    pub fn add_interaction(
        &mut self,
        tuples: Vec<Vec<u32>>,
        expression: impl Into<String>,
        group: u32,
    ) -> Result<()> {
        let registry = self.registry_mut("add_interaction")?;
        if registry.add_interaction(tuples, expression, group)? {
            debug!(term = registry.terms().len() - 1, group, "registered bonded term");
        }
        Ok(())
    }

    /// Register a caller-owned buffer and return the name snippets use for it.
    pub fn add_argument(&mut self, buffer: Arc<B::Buffer>, type_name: &str) -> Result<String> {
        self.registry_mut("add_argument")?
            .add_argument(buffer, type_name)
    }

    /// Append module-scope code ahead of the kernel.
    pub fn add_prefix_code(&mut self, source: impl Into<String>) -> Result<()> {
        self.registry_mut("add_prefix_code")?.add_prefix_code(source);
        Ok(())
    }

    /// Pack, generate and compile. Valid once, from `Uninitialized`.
    ///
    /// An empty registry skips compilation and goes straight to `Ready`.
    pub fn build(&mut self) -> Result<()> {
        let registry = match std::mem::replace(&mut self.stage, Stage::Failed) {
            Stage::Uninitialized(registry) => registry,
            other => {
                self.stage = other;
                return Err(self.invalid("build"));
            }
        };

        let built = pipeline::build(&*self.backend, registry, &self.accumulators, &self.config)?;
        self.stage = if built.compiled.is_none() {
            Stage::Ready(dispatch::prepare(&*self.backend, built, &self.accumulators)?)
        } else {
            Stage::Built(built)
        };
        Ok(())
    }

    /// Bind every argument once. Valid from `Built`.
    pub fn prepare(&mut self) -> Result<()> {
        let built = match std::mem::replace(&mut self.stage, Stage::Failed) {
            Stage::Built(built) => built,
            other => {
                self.stage = other;
                return Err(self.invalid("prepare"));
            }
        };
        let ready = dispatch::prepare(&*self.backend, built, &self.accumulators)?;
        self.stage = Stage::Ready(ready);
        Ok(())
    }

    /// Build and prepare in one call.
    pub fn initialize(&mut self) -> Result<()> {
        self.build()?;
        if self.state() == LifecycleState::Built {
            self.prepare()?;
        }
        Ok(())
    }

    /// Launch the kernel for the groups set in `group_mask`. Valid in `Ready`.
    pub fn dispatch(&self, group_mask: u32) -> Result<()> {
        match &self.stage {
            Stage::Ready(ready) => ready.dispatch(&*self.backend, group_mask),
            _ => Err(self.invalid("dispatch")),
        }
    }

    /// Summary of the built kernel; `None` before a successful build.
    pub fn summary(&self) -> Option<&KernelSummary> {
        match &self.stage {
            Stage::Built(built) => Some(&built.summary),
            Stage::Ready(ready) => Some(&ready.summary),
            Stage::Uninitialized(_) | Stage::Failed => None,
        }
    }

    pub fn max_tuple_count(&self) -> Option<usize> {
        self.summary().map(|s| s.max_tuple_count)
    }

    pub fn num_terms(&self) -> Option<usize> {
        self.summary().map(|s| s.num_terms)
    }

    pub fn num_index_buffers(&self) -> Option<usize> {
        self.summary().map(|s| s.num_index_buffers)
    }

    pub fn param_count(&self) -> Option<usize> {
        self.summary().map(|s| s.param_count)
    }

    /// Final kernel source, without the injected constants.
    pub fn kernel_source(&self) -> Option<&str> {
        self.summary().and_then(|s| s.source.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, RecordingBackend};
    use bonded_codegen::{IndexWidth, ParamKind};

    fn setup(num_atoms: usize) -> (Arc<RecordingBackend>, BondedForces<RecordingBackend>) {
        setup_with(num_atoms, 1024, BondedConfig::default())
    }

    fn setup_with(
        num_atoms: usize,
        energy_slots: usize,
        config: BondedConfig,
    ) -> (Arc<RecordingBackend>, BondedForces<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::default());
        let accumulators = backend.accumulators(num_atoms, energy_slots);
        let forces = BondedForces::new(Arc::clone(&backend), accumulators, config).unwrap();
        (backend, forces)
    }

    const UNIT_X: &str = "force1 += vec3<f32>(1.0, 0.0, 0.0);\nforce2 += vec3<f32>(1.0, 0.0, 0.0);";

    #[test]
    fn test_lifecycle_happy_path() {
        let (backend, mut forces) = setup(8);
        assert_eq!(forces.state(), LifecycleState::Uninitialized);

        forces
            .add_interaction(vec![vec![0, 1], vec![2, 3]], UNIT_X, 0)
            .unwrap();
        forces.build().unwrap();
        assert_eq!(forces.state(), LifecycleState::Built);
        assert!(backend.launches().is_empty());

        forces.prepare().unwrap();
        assert_eq!(forces.state(), LifecycleState::Ready);

        forces.dispatch(0b1).unwrap();
        forces.dispatch(0b1).unwrap();
        assert_eq!(backend.launches(), vec![(1, 1), (1, 1)]);
        // Arguments bound exactly once
        assert_eq!(backend.count(|c| matches!(c, Call::Bind { .. })), 1);
    }

    #[test]
    fn test_wrong_state_operations_rejected() {
        let (_, mut forces) = setup(4);
        assert!(matches!(
            forces.dispatch(1),
            Err(BondedError::InvalidState {
                operation: "dispatch",
                state: LifecycleState::Uninitialized
            })
        ));
        assert!(matches!(
            forces.prepare(),
            Err(BondedError::InvalidState { operation: "prepare", .. })
        ));

        forces.add_interaction(vec![vec![0, 1]], UNIT_X, 0).unwrap();
        forces.build().unwrap();

        assert!(matches!(
            forces.build(),
            Err(BondedError::InvalidState {
                operation: "build",
                state: LifecycleState::Built
            })
        ));
        assert!(matches!(
            forces.add_interaction(vec![vec![2, 3]], UNIT_X, 0),
            Err(BondedError::InvalidState { operation: "add_interaction", .. })
        ));
        assert!(matches!(
            forces.add_prefix_code("fn f() {}"),
            Err(BondedError::InvalidState { .. })
        ));
        assert!(matches!(
            forces.dispatch(1),
            Err(BondedError::InvalidState {
                state: LifecycleState::Built,
                ..
            })
        ));

        forces.prepare().unwrap();
        assert!(matches!(
            forces.add_argument(Arc::new(RecordingBackend::detached_buffer()), "f32"),
            Err(BondedError::InvalidState {
                state: LifecycleState::Ready,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_build_dispatch_is_noop() {
        let (backend, mut forces) = setup(4);
        forces.add_interaction(vec![], UNIT_X, 0).unwrap();
        forces.build().unwrap();

        assert_eq!(forces.state(), LifecycleState::Ready);
        assert_eq!(forces.num_terms(), Some(0));
        assert_eq!(forces.kernel_source(), None);
        forces.dispatch(u32::MAX).unwrap();

        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_parameter_count_and_order() {
        let (backend, mut forces) = setup(16);
        let params = Arc::new(RecordingBackend::detached_buffer());
        let name = forces.add_argument(Arc::clone(&params), "vec2<f32>").unwrap();
        assert_eq!(name, "customArg1");

        forces
            .add_interaction(vec![vec![0, 1], vec![1, 2]], UNIT_X, 0)
            .unwrap();
        forces
            .add_interaction(vec![vec![0, 1, 2, 3, 4]], "energy += 1.0;", 1)
            .unwrap();
        forces.initialize().unwrap();

        // 4 fixed + 1 + 2 index buffers + 1 external
        assert_eq!(forces.param_count(), Some(8));
        assert_eq!(forces.num_index_buffers(), Some(3));
        assert_eq!(forces.max_tuple_count(), Some(2));

        let kinds = backend.kernel_params();
        assert_eq!(kinds[4], ParamKind::AtomIndices(IndexWidth::Vec4));
        assert_eq!(kinds[5], ParamKind::AtomIndices(IndexWidth::Vec4));
        assert_eq!(kinds[6], ParamKind::AtomIndices(IndexWidth::Scalar));
        assert!(matches!(kinds[7], ParamKind::External { .. }));

        let bound = backend.bound_args();
        let acc = forces.accumulators();
        assert_eq!(bound[0], Some(acc.forces.id));
        assert_eq!(bound[1], Some(acc.energy.id));
        assert_eq!(bound[2], Some(acc.positions.id));
        assert_eq!(bound[3], None);
        assert_eq!(bound[7], Some(params.id));
    }

    #[test]
    fn test_uploaded_index_layout() {
        let (backend, mut forces) = setup(8);
        forces
            .add_interaction(vec![vec![0, 1, 2], vec![3, 4, 5]], UNIT_X, 0)
            .unwrap();
        forces.build().unwrap();

        let uploads = backend.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "atom_indices0_0");
        assert_eq!(uploads[0].1, vec![0, 1, 2, 2, 3, 4, 5, 5]);
    }

    #[test]
    fn test_defines_and_source() {
        let (backend, mut forces) = setup(40);
        forces.add_prefix_code("fn scale() -> f32 {").unwrap();
        forces.add_prefix_code(" return 2.0; }").unwrap();
        forces
            .add_interaction(vec![vec![0, 1]], "energy += scale();", 4)
            .unwrap();
        forces.build().unwrap();

        let defines = backend.defines();
        assert_eq!(defines.get("PADDED_NUM_ATOMS").map(String::as_str), Some("64u"));
        assert_eq!(defines.get("NUM_ATOMS").map(String::as_str), Some("40u"));
        assert_eq!(defines.get("WORKGROUP_SIZE").map(String::as_str), Some("64u"));

        let source = forces.kernel_source().unwrap();
        assert!(source.contains("fn scale() -> f32 { return 2.0; }"));
        assert!(source.contains("if ((groups.mask & 16u) != 0u)"));
        assert!(source.contains("fn compute_bonded_forces("));
    }

    #[test]
    fn test_compile_failure_moves_to_failed() {
        let (backend, mut forces) = setup(4);
        backend.fail_compile("error: expected ';'");
        forces.add_interaction(vec![vec![0, 1]], UNIT_X, 0).unwrap();

        match forces.build() {
            Err(BondedError::Compile { diagnostic }) => {
                assert_eq!(diagnostic, "error: expected ';'")
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }
        assert_eq!(forces.state(), LifecycleState::Failed);
        assert!(forces.summary().is_none());
        assert!(matches!(
            forces.build(),
            Err(BondedError::InvalidState {
                state: LifecycleState::Failed,
                ..
            })
        ));
    }

    #[test]
    fn test_energy_buffer_must_cover_grid() {
        let config = BondedConfig {
            workgroup_size: 32,
            ..Default::default()
        };
        let (backend, mut forces) = setup_with(200, 64, config);
        let tuples: Vec<Vec<u32>> = (0..100).map(|i| vec![i, i + 1]).collect();
        forces.add_interaction(tuples, UNIT_X, 0).unwrap();

        assert!(matches!(forces.build(), Err(BondedError::Configuration(_))));
        assert_eq!(forces.state(), LifecycleState::Failed);
        assert!(backend.uploads().is_empty());
    }

    #[test]
    fn test_workgroups_cover_largest_term() {
        let config = BondedConfig {
            workgroup_size: 32,
            ..Default::default()
        };
        let (backend, mut forces) = setup_with(200, 4096, config);
        forces.add_interaction(vec![vec![0, 1]], UNIT_X, 0).unwrap();
        let tuples: Vec<Vec<u32>> = (0..100).map(|i| vec![i, i + 1, i + 2]).collect();
        forces.add_interaction(tuples, UNIT_X, 1).unwrap();
        forces.initialize().unwrap();
        forces.dispatch(0b10).unwrap();

        assert_eq!(backend.launches(), vec![(0b10, 4)]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let backend = Arc::new(RecordingBackend::default());
        let accumulators = backend.accumulators(4, 64);
        let config = BondedConfig {
            workgroup_size: 48,
            ..Default::default()
        };
        assert!(matches!(
            BondedForces::new(backend, accumulators, config),
            Err(BondedError::InvalidConfig(_))
        ));
    }
}
