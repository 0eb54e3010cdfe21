pub(crate) mod meta;
pub(crate) mod migrate;

#[cfg(feature = "wecom")]
pub(crate) mod schedule;
#[cfg(feature = "wecom")]
pub(crate) mod shared;
#[cfg(feature = "wecom")]
pub(crate) mod sync;
