pub mod scope_guard;

pub use scope_guard::ScopeGuard;
