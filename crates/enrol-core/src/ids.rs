//! Strongly-typed POSIX numeric identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate numeric id wrappers
macro_rules! define_numeric_id {
    ($name:ident, $attr:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            pub const fn new(value: u32) -> Self {
                Self(value)
            }

            pub const fn get(self) -> u32 {
                self.0
            }

            /// Directory attribute carrying this id
            pub const fn attribute() -> &'static str {
                $attr
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                s.trim().parse::<u32>().map(Self)
            }
        }
    };
}

define_numeric_id!(UidNumber, "uidNumber");
define_numeric_id!(GidNumber, "gidNumber");
