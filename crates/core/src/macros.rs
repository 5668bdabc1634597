// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Declarative macros for reducing boilerplate.
//!
//! - [`label_enum!`] — stable string labels plus `Display` for status enums

/// Map enum variants to stable string labels.
///
/// Generates a `label()` method returning the `&'static str` name (for
/// logs, metrics fields, and persisted rows) and a `Display` impl writing
/// the same label. Unit variants match directly; data-carrying variants use
/// `(..)` to ignore fields.
///
/// ```ignore
/// crate::label_enum! {
///     MyStatus {
///         Ready => "ready",
///         Failed(..) => "failed",
///     }
/// }
/// ```
#[macro_export]
macro_rules! label_enum {
    ($enum:ty { $( $variant:ident $(( $($ignore:tt)* ))? => $label:expr ),+ $(,)? }) => {
        impl $enum {
            /// Stable wire/log label for this variant.
            pub fn label(&self) -> &'static str {
                match self {
                    $( Self::$variant $(( $($ignore)* ))? => $label, )+
                }
            }
        }

        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}
