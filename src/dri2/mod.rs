//! Buffer exchange with rendering clients: buffer allocation, per-window delivery state and the
//! publish path.

pub(crate) mod buffer;
pub(crate) mod manager;
pub(crate) mod queue;
pub(crate) mod window;
