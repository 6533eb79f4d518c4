/// The out-of-band health poller (spec §4.7) — reports findings to the
/// Reconciler but never mutates runtime or proxy state itself.
pub(crate) mod prober;
