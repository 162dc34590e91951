//! Cascade build orchestration
//!
//! Drives an external toolchain over a tree of nested workspaces:
//! - Workspace discovery with cycle detection
//! - Timestamp-based staleness checks
//! - Feature matrix expansion for inspection
//! - Format/lint/test/build steps inside a retry loop
//! - Artifact publishing after a successful loop

pub mod cancel;
pub mod config;
pub mod controller;
pub mod error;
pub mod expand;
pub mod features;
pub mod orchestrator;
pub mod publish;
pub mod staleness;
pub mod steps;
pub mod toolchain;
pub mod workspace;

// Re-export main types
pub use cancel::CancellationToken;
pub use config::{BuildConfig, ExpansionConfig, Layout};
pub use controller::{
    CycleFailure, CycleReport, DecisionPolicy, LoopObserver, LoopResult, LoopState,
    NoopObserver, OperatorDecision, RetryLoopController, RetryPolicy,
};
pub use error::{BuildError, BuildResult};
pub use expand::{ExpansionRecord, ExpansionRunner, ExpansionStats};
pub use features::{feature_subsets, ExpansionJob, ExpansionTarget, FeatureMatrix, MAX_FEATURES};
pub use orchestrator::{BuildReport, BuildStatus, Orchestrator};
pub use publish::{ArtifactPublisher, ArtifactSpec, PublishedArtifact};
pub use staleness::{
    success_marker, FileSet, StalenessDetector, StalenessSignal, StalenessSummary,
    SUCCESS_MARKER,
};
pub use steps::{BuildOutcome, Step, StepFailure, StepRunner, StepStatus};
pub use toolchain::{CommandOutput, CommandSet, Invocation, ProcessToolchain, Toolchain};
pub use workspace::{ProcessingOrder, Workspace, WorkspaceDiscoverer, WorkspaceSet};

// Re-export cascade-manifest types for convenience
pub use cascade_manifest::Manifest;
