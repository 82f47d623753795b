//! A serde deserializer over path captures.
//!
//! Captures are textual; this deserializer converts them per field:
//! structs deserialize by capture name, tuples by capture position, and a
//! lone primitive from a single capture. Anything that does not fit the
//! shape of a capture list (nested maps, byte arrays, ...) is rejected.

use serde::de::value::StrDeserializer;
use serde::de::{self, DeserializeSeed, IntoDeserializer, MapAccess, SeqAccess, Visitor};
use serde::forward_to_deserialize_any;
use std::fmt::{self, Display};

use crate::router::Params;

/// Error raised while destructuring captures.
#[derive(Debug)]
pub(crate) struct PathDeError {
    message: String,
}

impl PathDeError {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl Display for PathDeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for PathDeError {}

impl de::Error for PathDeError {
    fn custom<T: Display>(message: T) -> Self {
        Self::new(message.to_string())
    }
}

/// Deserializer over the full capture list.
pub(crate) struct PathDeserializer<'de> {
    params: &'de Params,
}

impl<'de> PathDeserializer<'de> {
    pub(crate) fn new(params: &'de Params) -> Self {
        Self { params }
    }

    fn single_value(&self) -> Result<&'de str, PathDeError> {
        let mut values = self.params.iter().map(|(_, value)| value);
        match (values.next(), values.next()) {
            (Some(value), None) => Ok(value),
            _ => Err(PathDeError::new(format!("expected a single capture, pattern has {}", self.params.len()))),
        }
    }
}

macro_rules! delegate_to_single_part {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PathDeError> {
                PartDeserializer { value: self.single_value()? }.$method(visitor)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for PathDeserializer<'de> {
    type Error = PathDeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PathDeError> {
        self.deserialize_map(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PathDeError> {
        visitor.visit_map(ParamsMap { entries: self.params.iter().collect(), index: 0, pending: None })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, PathDeError> {
        self.deserialize_map(visitor)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PathDeError> {
        visitor.visit_seq(ParamsSeq { values: self.params.iter().map(|(_, value)| value).collect(), index: 0 })
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value, PathDeError> {
        if len > self.params.len() {
            return Err(PathDeError::new(format!(
                "tuple of {len} fields but the pattern captures only {}",
                self.params.len()
            )));
        }
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, PathDeError> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, PathDeError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PathDeError> {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PathDeError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, PathDeError> {
        visitor.visit_unit()
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PathDeError> {
        visitor.visit_unit()
    }

    delegate_to_single_part! {
        deserialize_bool
        deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64 deserialize_i128
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64 deserialize_u128
        deserialize_f32 deserialize_f64
        deserialize_char deserialize_str deserialize_string
        deserialize_identifier
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, PathDeError> {
        Err(PathDeError::new("byte arrays are not supported in path captures"))
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, PathDeError> {
        Err(PathDeError::new("byte arrays are not supported in path captures"))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, PathDeError> {
        PartDeserializer { value: self.single_value()? }.deserialize_enum(name, variants, visitor)
    }
}

struct ParamsMap<'de> {
    entries: Vec<(&'de str, &'de str)>,
    index: usize,
    pending: Option<&'de str>,
}

impl<'de> MapAccess<'de> for ParamsMap<'de> {
    type Error = PathDeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, PathDeError> {
        let Some((key, value)) = self.entries.get(self.index) else {
            return Ok(None);
        };
        self.index += 1;
        self.pending = Some(value);
        seed.deserialize(StrDeserializer::new(key)).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, PathDeError> {
        let value = self.pending.take().expect("next_value_seed called before next_key_seed");
        seed.deserialize(PartDeserializer { value })
    }
}

struct ParamsSeq<'de> {
    values: Vec<&'de str>,
    index: usize,
}

impl<'de> SeqAccess<'de> for ParamsSeq<'de> {
    type Error = PathDeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>, PathDeError> {
        let Some(value) = self.values.get(self.index) else {
            return Ok(None);
        };
        self.index += 1;
        seed.deserialize(PartDeserializer { value }).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.values.len() - self.index)
    }
}

/// Deserializer for one capture value.
struct PartDeserializer<'de> {
    value: &'de str,
}

macro_rules! parse_part {
    ($($method:ident => $visit:ident as $ty:ty,)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PathDeError> {
                let parsed: $ty = self.value.parse().map_err(|_| {
                    PathDeError::new(format!("cannot convert capture {:?} to {}", self.value, stringify!($ty)))
                })?;
                visitor.$visit(parsed)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for PartDeserializer<'de> {
    type Error = PathDeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PathDeError> {
        visitor.visit_borrowed_str(self.value)
    }

    parse_part! {
        deserialize_bool => visit_bool as bool,
        deserialize_i8 => visit_i8 as i8,
        deserialize_i16 => visit_i16 as i16,
        deserialize_i32 => visit_i32 as i32,
        deserialize_i64 => visit_i64 as i64,
        deserialize_i128 => visit_i128 as i128,
        deserialize_u8 => visit_u8 as u8,
        deserialize_u16 => visit_u16 as u16,
        deserialize_u32 => visit_u32 as u32,
        deserialize_u64 => visit_u64 as u64,
        deserialize_u128 => visit_u128 as u128,
        deserialize_f32 => visit_f32 as f32,
        deserialize_f64 => visit_f64 as f64,
        deserialize_char => visit_char as char,
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PathDeError> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, PathDeError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, PathDeError> {
        visitor.visit_enum(self.value.into_deserializer())
    }

    forward_to_deserialize_any! {
        str string bytes byte_buf unit unit_struct seq tuple tuple_struct map struct identifier ignored_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;

    fn params(entries: &[(&str, &str)]) -> Params {
        Params::from_entries(entries.iter().map(|(name, value)| (Arc::from(*name), (*value).to_owned())).collect())
    }

    #[derive(Deserialize, Debug, PartialEq)]
    struct UserYear {
        user: String,
        year: u32,
    }

    #[test]
    fn struct_by_field_name() {
        let params = params(&[("user", "alice"), ("year", "2024")]);
        let value = UserYear::deserialize(PathDeserializer::new(&params)).unwrap();
        assert_eq!(value, UserYear { user: "alice".into(), year: 2024 });
    }

    #[test]
    fn tuple_by_position() {
        let params = params(&[("user", "bob"), ("year", "1999")]);
        let (user, year) = <(String, u16)>::deserialize(PathDeserializer::new(&params)).unwrap();
        assert_eq!(user, "bob");
        assert_eq!(year, 1999);
    }

    #[test]
    fn single_primitive() {
        let params = params(&[("id", "42")]);
        let id = u64::deserialize(PathDeserializer::new(&params)).unwrap();
        assert_eq!(id, 42);
    }

    #[test]
    fn conversion_failure_reports_the_capture() {
        let params = params(&[("id", "abc")]);
        let err = u64::deserialize(PathDeserializer::new(&params)).unwrap_err();
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn tuple_wider_than_captures_is_rejected() {
        let params = params(&[("id", "42")]);
        assert!(<(String, String)>::deserialize(PathDeserializer::new(&params)).is_err());
    }
}
