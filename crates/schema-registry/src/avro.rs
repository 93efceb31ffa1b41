//! Avro codec backed by `apache-avro`.

use apache_avro::Schema;
use apache_avro::schema::{Name, NamesRef, ResolvedSchema};
use apache_avro::types::Value as AvroValue;
use serde_json::{Map, Value as JsonValue};
use topicgate_core::EncodingError;

use crate::SchemaCodec;

/// A parsed Avro schema.
#[derive(Debug, Clone)]
pub struct AvroCodec {
    schema: Schema,
}

impl AvroCodec {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn parse(text: &str) -> Result<Self, apache_avro::Error> {
        Schema::parse_str(text).map(Self::new)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl SchemaCodec for AvroCodec {
    fn native_from_text(
        &self,
        text: &[u8],
    ) -> Result<AvroValue, EncodingError> {
        let json: JsonValue =
            serde_json::from_slice(text).map_err(violation)?;

        let resolved = ResolvedSchema::try_from(&self.schema)
            .map_err(|e| EncodingError::Codec {
                details: format!("schema references: {e}").into(),
            })?;
        let json = normalize(json, &self.schema, resolved.get_names())?;

        AvroValue::from(json)
            .resolve(&self.schema)
            .map_err(violation)
    }

    fn binary_from_native(
        &self,
        native: AvroValue,
    ) -> Result<Vec<u8>, EncodingError> {
        apache_avro::to_avro_datum(&self.schema, native).map_err(|e| {
            EncodingError::Codec {
                details: format!("avro encode: {e}").into(),
            }
        })
    }
}

fn violation(e: impl std::fmt::Display) -> EncodingError {
    EncodingError::SchemaViolation {
        details: e.to_string().into(),
    }
}

/// Prepare JSON for `resolve`: strip Avro-JSON union wrappers
/// (`{"string": "x"}`) and range-check integers.
///
/// `resolve` narrows `long` to `int` with a plain cast, so an out-of-range
/// number has to be rejected here. Values without a union wrapper are left
/// alone and `resolve` picks the first union branch that fits.
fn normalize(
    value: JsonValue,
    schema: &Schema,
    names: &NamesRef<'_>,
) -> Result<JsonValue, EncodingError> {
    match (schema, value) {
        (Schema::Ref { name }, value) => match names.get(name) {
            Some(target) => normalize(value, target, names),
            None => Ok(value),
        },
        (Schema::Int, JsonValue::Number(n)) => {
            check_integer(n, i64::from(i32::MIN), i64::from(i32::MAX), "int")
        }
        (Schema::Long, JsonValue::Number(n)) => {
            check_integer(n, i64::MIN, i64::MAX, "long")
        }
        (Schema::Union(union), JsonValue::Object(map)) if map.len() == 1 => {
            let branch = map.keys().next().cloned().unwrap_or_default();
            let variant = union
                .variants()
                .iter()
                .find(|v| branch_matches(v, &branch, names));
            match variant {
                Some(variant) => {
                    let inner = map
                        .into_iter()
                        .next()
                        .map(|(_, v)| v)
                        .unwrap_or(JsonValue::Null);
                    normalize(inner, variant, names)
                }
                None => normalize_single_branch(
                    JsonValue::Object(map),
                    union.variants(),
                    names,
                ),
            }
        }
        (Schema::Union(union), value) => {
            normalize_single_branch(value, union.variants(), names)
        }
        (Schema::Record(record), JsonValue::Object(mut map)) => {
            for field in &record.fields {
                if let Some(v) = map.remove(&field.name) {
                    let v = normalize(v, &field.schema, names)?;
                    map.insert(field.name.clone(), v);
                }
            }
            Ok(JsonValue::Object(map))
        }
        (Schema::Array(array), JsonValue::Array(items)) => items
            .into_iter()
            .map(|item| normalize(item, &array.items, names))
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        (Schema::Map(map_schema), JsonValue::Object(map)) => map
            .into_iter()
            .map(|(k, v)| Ok((k, normalize(v, &map_schema.types, names)?)))
            .collect::<Result<Map<String, JsonValue>, EncodingError>>()
            .map(JsonValue::Object),
        (_, value) => Ok(value),
    }
}

/// Integral numbers must fit `[min, max]`; fractional numbers are left for
/// `resolve` to reject.
fn check_integer(
    n: serde_json::Number,
    min: i64,
    max: i64,
    kind: &str,
) -> Result<JsonValue, EncodingError> {
    if n.is_f64() {
        return Ok(JsonValue::Number(n));
    }
    match n.as_i64() {
        Some(v) if (min..=max).contains(&v) => Ok(JsonValue::Number(n)),
        _ => Err(violation(format!("{n} is out of range for {kind}"))),
    }
}

/// `["null", T]` unions with a bare value: descend into `T`.
fn normalize_single_branch(
    value: JsonValue,
    variants: &[Schema],
    names: &NamesRef<'_>,
) -> Result<JsonValue, EncodingError> {
    if value.is_null() {
        return Ok(value);
    }
    let mut non_null = variants.iter().filter(|v| !matches!(v, Schema::Null));
    match (non_null.next(), non_null.next()) {
        (Some(only), None) => normalize(value, only, names),
        _ => Ok(value),
    }
}

fn branch_matches(schema: &Schema, branch: &str, names: &NamesRef<'_>) -> bool {
    let primitive = match schema {
        Schema::Null => Some("null"),
        Schema::Boolean => Some("boolean"),
        Schema::Int => Some("int"),
        Schema::Long => Some("long"),
        Schema::Float => Some("float"),
        Schema::Double => Some("double"),
        Schema::Bytes => Some("bytes"),
        Schema::String => Some("string"),
        Schema::Array(_) => Some("array"),
        Schema::Map(_) => Some("map"),
        _ => None,
    };
    if let Some(p) = primitive {
        return p == branch;
    }

    let name: Option<&Name> = match schema {
        Schema::Ref { name } => names.get(name).and_then(|s| s.name()),
        other => other.name(),
    };
    name.is_some_and(|n| n.name == branch || n.fullname(None) == branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const ORDER: &str = r#"{
        "type": "record",
        "name": "Order",
        "namespace": "com.acme.orders",
        "fields": [
            {"name": "id", "type": "int"},
            {"name": "note", "type": ["null", "string"], "default": null},
            {"name": "qty", "type": "long", "default": 1}
        ]
    }"#;

    fn encode(codec: &AvroCodec, payload: JsonValue) -> Vec<u8> {
        let text = serde_json::to_vec(&payload).unwrap();
        let native = codec.native_from_text(&text).unwrap();
        codec.binary_from_native(native).unwrap()
    }

    #[test]
    fn encodes_single_int_record() {
        let codec = AvroCodec::parse(
            r#"{"type":"record","name":"R","fields":[{"name":"id","type":"int"}]}"#,
        )
        .unwrap();
        assert_eq!(encode(&codec, json!({"id": 1})), vec![0x02]);
    }

    #[test]
    fn fills_defaults_and_accepts_union_wrappers() {
        let codec = AvroCodec::parse(ORDER).unwrap();

        let plain = encode(&codec, json!({"id": 1, "note": "rush"}));
        let wrapped = encode(&codec, json!({"id": 1, "note": {"string": "rush"}}));
        assert_eq!(plain, wrapped);

        let decoded = apache_avro::from_avro_datum(
            codec.schema(),
            &mut plain.as_slice(),
            None,
        )
        .unwrap();
        assert_eq!(
            decoded,
            AvroValue::Record(vec![
                ("id".into(), AvroValue::Int(1)),
                (
                    "note".into(),
                    AvroValue::Union(1, Box::new(AvroValue::String("rush".into())))
                ),
                ("qty".into(), AvroValue::Long(1)),
            ])
        );
    }

    #[test]
    fn wrong_type_is_a_schema_violation() {
        let codec = AvroCodec::parse(ORDER).unwrap();
        let err = codec
            .native_from_text(br#"{"id": "not-a-number"}"#)
            .unwrap_err();
        assert!(matches!(err, EncodingError::SchemaViolation { .. }));
    }

    #[test]
    fn missing_required_field_is_a_schema_violation() {
        let codec = AvroCodec::parse(ORDER).unwrap();
        let err = codec.native_from_text(br#"{"note": null}"#).unwrap_err();
        assert!(matches!(err, EncodingError::SchemaViolation { .. }));
    }

    #[test]
    fn malformed_text_is_a_schema_violation() {
        let codec = AvroCodec::parse(ORDER).unwrap();
        let err = codec.native_from_text(b"{not json").unwrap_err();
        assert!(matches!(err, EncodingError::SchemaViolation { .. }));
    }

    #[test]
    fn unwraps_nested_arrays_of_records() {
        let codec = AvroCodec::parse(
            r#"{
                "type": "record", "name": "Batch",
                "fields": [{"name": "items", "type": {"type": "array", "items": {
                    "type": "record", "name": "Item",
                    "fields": [{"name": "sku", "type": ["null", "string"]}]
                }}}]
            }"#,
        )
        .unwrap();

        let plain = encode(&codec, json!({"items": [{"sku": "a"}, {"sku": null}]}));
        let wrapped = encode(
            &codec,
            json!({"items": [{"sku": {"string": "a"}}, {"sku": null}]}),
        );
        assert_eq!(plain, wrapped);
    }

    #[test]
    fn int_overflow_is_a_schema_violation() {
        let codec = AvroCodec::parse(ORDER).unwrap();
        let cases: [&[u8]; 3] = [
            br#"{"id": 3000000000}"#,
            br#"{"id": -2147483649}"#,
            br#"{"id": 18446744073709551615}"#,
        ];
        for text in cases {
            let err = codec.native_from_text(text).unwrap_err();
            assert!(
                matches!(err, EncodingError::SchemaViolation { .. }),
                "{}",
                String::from_utf8_lossy(text)
            );
        }
    }

    #[test]
    fn int_bounds_are_accepted() {
        let codec = AvroCodec::parse(ORDER).unwrap();
        let native = codec
            .native_from_text(br#"{"id": 2147483647, "qty": -9223372036854775808}"#)
            .unwrap();
        let AvroValue::Record(fields) = native else {
            panic!("expected record");
        };
        assert_eq!(fields[0], ("id".to_string(), AvroValue::Int(i32::MAX)));
        assert_eq!(fields[2], ("qty".to_string(), AvroValue::Long(i64::MIN)));
    }

    #[test]
    fn long_overflow_is_a_schema_violation() {
        let codec = AvroCodec::parse(ORDER).unwrap();
        let err = codec
            .native_from_text(br#"{"id": 1, "qty": 18446744073709551615}"#)
            .unwrap_err();
        assert!(matches!(err, EncodingError::SchemaViolation { .. }));
    }

    #[test]
    fn range_check_reaches_nested_unions_and_arrays() {
        let codec = AvroCodec::parse(
            r#"{
                "type": "record", "name": "Counts",
                "fields": [
                    {"name": "maybe", "type": ["null", "int"], "default": null},
                    {"name": "all", "type": {"type": "array", "items": "int"}}
                ]
            }"#,
        )
        .unwrap();

        let err = codec
            .native_from_text(br#"{"maybe": {"int": 4294967296}, "all": []}"#)
            .unwrap_err();
        assert!(matches!(err, EncodingError::SchemaViolation { .. }));

        let err = codec
            .native_from_text(br#"{"maybe": null, "all": [1, 2, 3000000000]}"#)
            .unwrap_err();
        assert!(matches!(err, EncodingError::SchemaViolation { .. }));

        assert!(codec.native_from_text(br#"{"maybe": 5, "all": [1]}"#).is_ok());
    }
}
