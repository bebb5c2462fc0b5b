// SPDX-License-Identifier: MPL-2.0

mod types;

pub use types::{Reflection, User, counter, echoed_set, fields, parse_timestamp};
