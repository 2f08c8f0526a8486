pub(crate) mod actor;
pub(crate) mod ops;
pub(crate) mod scheduler;

pub(in crate::providers) use actor::spawn;
