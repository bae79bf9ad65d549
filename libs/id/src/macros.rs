//! Macros for defining typed ID types.

/// Macro to define a typed numeric ID with a specific prefix.
///
/// This generates a newtype wrapper around `u32` with:
/// - A `PREFIX` constant
/// - `new()` which rejects the reserved zero value
/// - `parse()` accepting either `{prefix}-{n}` or a bare `n`
/// - `Display` and `FromStr` implementations
/// - `Serialize` (as a number) and `Deserialize` (number or string)
/// - `Ord`, `Hash`, and other standard traits
///
/// # Example
///
/// ```ignore
/// define_id!(NodeId, "node");
///
/// let node_id = NodeId::new(12)?;
/// let parsed: NodeId = "node-12".parse()?;
/// assert_eq!(node_id, parsed);
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        /// A typed ID for this resource type.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            /// The prefix for this ID type.
            pub const PREFIX: &'static str = $prefix;

            /// Creates an ID from its numeric value.
            pub fn new(value: u32) -> Result<Self, $crate::IdError> {
                if value == 0 {
                    return Err($crate::IdError::Zero { kind: Self::PREFIX });
                }
                Ok(Self(value))
            }

            /// Returns the numeric value.
            #[must_use]
            pub const fn get(&self) -> u32 {
                self.0
            }

            /// Parses an ID from a string.
            ///
            /// The string must be `{prefix}-{number}` or a bare number.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                let s = s.trim();
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }

                let digits = match s.split_once('-') {
                    Some((prefix, digits)) => {
                        if prefix != Self::PREFIX {
                            return Err($crate::IdError::InvalidPrefix {
                                expected: Self::PREFIX,
                                actual: prefix.to_string(),
                            });
                        }
                        digits
                    }
                    None => s,
                };

                let value = digits
                    .parse::<u32>()
                    .map_err(|e| $crate::IdError::InvalidNumber(e.to_string()))?;

                Self::new(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}-{}", Self::PREFIX, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<u32> for $name {
            type Error = $crate::IdError;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> u32 {
                id.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_u32(self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                struct IdVisitor;

                impl<'de> serde::de::Visitor<'de> for IdVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                        write!(f, "a {} ID as a number or \"{}-<n>\"", $prefix, $prefix)
                    }

                    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
                    where
                        E: serde::de::Error,
                    {
                        let value = u32::try_from(v).map_err(E::custom)?;
                        $name::new(value).map_err(E::custom)
                    }

                    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
                    where
                        E: serde::de::Error,
                    {
                        let value = u32::try_from(v).map_err(E::custom)?;
                        $name::new(value).map_err(E::custom)
                    }

                    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
                    where
                        E: serde::de::Error,
                    {
                        $name::parse(v).map_err(E::custom)
                    }
                }

                deserializer.deserialize_any(IdVisitor)
            }
        }
    };
}
