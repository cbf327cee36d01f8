/// The stages of a reconstruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PipelineStage {
    /// Nothing has run yet.
    Idle,
    /// Estimating the camera intrinsics.
    Calibrating,
    /// Detecting features and matching descriptors.
    Matching,
    /// Estimating the fundamental and essential matrices.
    EstimatingGeometry,
    /// Selecting the relative pose among the essential matrix factorizations.
    RecoveringPose,
    /// Triangulating the correspondences.
    Triangulating,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Calibrating => "calibrating",
            PipelineStage::Matching => "matching",
            PipelineStage::EstimatingGeometry => "estimating geometry",
            PipelineStage::RecoveringPose => "recovering pose",
            PipelineStage::Triangulating => "triangulating",
        };
        write!(f, "{name}")
    }
}

/// State of the pipeline, or of a single image pair going through it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum PipelineState {
    /// A stage is running.
    Running(PipelineStage),
    /// Every stage completed.
    Done,
    /// A stage failed.
    Failed {
        /// The stage that was running.
        stage: PipelineStage,
        /// Human readable failure reason.
        reason: String,
    },
}

impl PipelineState {
    /// Whether no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed { .. })
    }
}

/// Records and logs the state transitions of one unit of work.
#[derive(Debug)]
pub(crate) struct StateTracker {
    label: String,
    state: PipelineState,
    transitions: Vec<PipelineState>,
}

impl StateTracker {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: PipelineState::Running(PipelineStage::Idle),
            transitions: vec![PipelineState::Running(PipelineStage::Idle)],
        }
    }

    /// The stage currently running, `Idle` once terminal.
    pub(crate) fn stage(&self) -> PipelineStage {
        match &self.state {
            PipelineState::Running(stage) => *stage,
            PipelineState::Failed { stage, .. } => *stage,
            PipelineState::Done => PipelineStage::Idle,
        }
    }

    pub(crate) fn enter(&mut self, stage: PipelineStage) {
        self.transition(PipelineState::Running(stage));
    }

    pub(crate) fn done(&mut self) {
        self.transition(PipelineState::Done);
    }

    pub(crate) fn fail(&mut self, reason: &impl std::fmt::Display) {
        let stage = self.stage();
        self.transition(PipelineState::Failed {
            stage,
            reason: reason.to_string(),
        });
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state.is_terminal() {
            log::warn!("[{}] ignoring transition {next:?} after {:?}", self.label, self.state);
            return;
        }
        match &next {
            PipelineState::Running(stage) => log::info!("[{}] {stage}", self.label),
            PipelineState::Done => log::info!("[{}] done", self.label),
            PipelineState::Failed { stage, reason } => {
                log::info!("[{}] failed while {stage}: {reason}", self.label)
            }
        }
        self.state = next.clone();
        self.transitions.push(next);
    }

    pub(crate) fn into_transitions(self) -> Vec<PipelineState> {
        self.transitions
    }
}
