// Caches in front of storage.
//
// - ttl.rs: capacity-bounded expire-after-write map
// - preference.rs: player preference records
// - ignore.rs: per-player ignore sets, expiring independently

pub mod ignore;
pub mod preference;
pub mod ttl;

pub use ignore::IgnoreCache;
pub use preference::PreferenceCache;
