//! The per-frame state machine tying the sequencer to a compute stage and a
//! render stage.
//!
//! One call to [`FrameDriver::step`] is one full cycle
//! `Idle -> ComputeIssued -> RenderIssued -> Idle`. The driver takes
//! `&mut self`, so two iterations can never interleave. A stage that panics
//! leaves the driver in the phase it was interrupted in; the next `step`
//! restarts that cycle with the same roles, since the sequencer only
//! advances once render has returned.

use super::sequencer::{BufferId, Roles, StepSequencer};

/// Applies the transition rule from `roles.read` into `roles.write`.
///
/// Implementations must fully overwrite the destination and must have
/// finished writing (or have ordered the write ahead of any later work, as
/// a single GPU queue does) before returning.
pub trait ComputeStage {
    type Buffer;
    fn compute(&mut self, roles: Roles);
    fn buffer(&self, id: BufferId) -> &Self::Buffer;
}

/// Presents one generation. Never mutates simulation state.
pub trait RenderStage<B> {
    type Error;
    fn render(&mut self, id: BufferId, generation: &B) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    ComputeIssued,
    RenderIssued,
}

pub struct FrameDriver<C, R> {
    sequencer: StepSequencer,
    phase: FramePhase,
    compute: C,
    render: R,
}

impl<C, R> FrameDriver<C, R>
where
    C: ComputeStage,
    R: RenderStage<C::Buffer>,
{
    pub fn new(compute: C, render: R) -> Self {
        Self {
            sequencer: StepSequencer::new(),
            phase: FramePhase::Idle,
            compute,
            render,
        }
    }

    /// Run one iteration: compute the next generation, render it, advance.
    ///
    /// A render failure is returned after the step has advanced, since the
    /// compute already landed and the new generation is valid.
    pub fn step(&mut self) -> Result<(), R::Error> {
        let roles = self.sequencer.current_roles();
        let step = self.sequencer.step();
        if self.phase != FramePhase::Idle {
            log::warn!("step {step} was interrupted in {:?}, restarting it", self.phase);
        }

        self.phase = FramePhase::ComputeIssued;
        self.compute.compute(roles);
        log::trace!("step {step}: compute {:?} -> {:?}", roles.read, roles.write);

        self.phase = FramePhase::RenderIssued;
        let rendered = self
            .render
            .render(roles.write, self.compute.buffer(roles.write));
        log::trace!("step {step}: render {:?}", roles.write);

        self.sequencer.advance();
        self.phase = FramePhase::Idle;
        rendered
    }

    /// Render the latest completed generation without computing a new one.
    pub fn redraw(&mut self) -> Result<(), R::Error> {
        let id = self.latest_id();
        self.render.render(id, self.compute.buffer(id))
    }

    /// After `advance`, the buffer just written is the next step's source.
    pub fn latest_id(&self) -> BufferId {
        self.sequencer.current_roles().read
    }

    pub fn latest(&self) -> &C::Buffer {
        self.compute.buffer(self.latest_id())
    }

    pub fn step_count(&self) -> u64 {
        self.sequencer.step()
    }

    /// `Idle` unless a stage panicked part way through a step.
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn compute(&self) -> &C {
        &self.compute
    }

    pub fn render_stage(&self) -> &R {
        &self.render
    }

    pub fn render_stage_mut(&mut self) -> &mut R {
        &mut self.render
    }
}
