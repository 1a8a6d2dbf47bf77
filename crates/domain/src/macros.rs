//! Macro for implementing string conversions on fieldless domain enums
//!
//! Entity kinds appear in cache keys, store URLs and push notifications, so
//! they need one canonical lowercase spelling. This macro generates `as_str`,
//! `Display` and `FromStr` from a single mapping table.
//!
//! # Example
//!
//! ```rust
//! use recordcache_domain::impl_domain_enum_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Color {
//!     Red,
//!     Blue,
//! }
//!
//! impl_domain_enum_conversions!(Color {
//!     Red => "red",
//!     Blue => "blue",
//! });
//!
//! assert_eq!(Color::Red.as_str(), "red");
//! assert_eq!("BLUE".parse::<Color>(), Ok(Color::Blue));
//! ```

/// Implements `as_str`, `Display` and `FromStr` for fieldless enums
///
/// Parsing is case-insensitive and trims surrounding whitespace; output is
/// always the canonical spelling from the mapping table.
#[macro_export]
macro_rules! impl_domain_enum_conversions {
    ($enum_name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl $enum_name {
            /// Canonical string form.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
