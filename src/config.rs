// SPDX-License-Identifier: MPL-2.0

pub const APP_ID: &str = "io.github.sethcottle.Reflections";

#[cfg(feature = "devel")]
pub const IS_DEVEL: bool = true;
#[cfg(not(feature = "devel"))]
pub const IS_DEVEL: bool = false;

/// Collection holding user documents
pub const USERS_COLLECTION: &str = "users";
/// Collection holding reflection documents
pub const REFLECTIONS_COLLECTION: &str = "reflections";

/// Default tracing filter when settings don't override it
pub const DEFAULT_LOG_FILTER: &str = "info";
/// Tracing filter for development builds
pub const DEVEL_LOG_FILTER: &str = "reflections_core=debug,info";
