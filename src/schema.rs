use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Write as _};

/// Closed set of JSON value kinds tracked per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeTag {
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Array,
    Object,
}

impl TypeTag {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => TypeTag::Integer,
            Value::Number(n) if is_integer_literal(&n.to_string()) => TypeTag::Integer,
            Value::Number(_) => TypeTag::Float,
            Value::String(_) => TypeTag::String,
            Value::Array(_) => TypeTag::Array,
            Value::Object(_) => TypeTag::Object,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Null => "null",
            TypeTag::Boolean => "boolean",
            TypeTag::Integer => "integer",
            TypeTag::Float => "floating-point",
            TypeTag::String => "string",
            TypeTag::Array => "array",
            TypeTag::Object => "object",
        }
    }
}

/// Numbers keep their source text, so integers past the 64-bit range are still integers.
fn is_integer_literal(text: &str) -> bool {
    !text.contains(['.', 'e', 'E'])
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Line counters plus per-field prevalence and type distribution for one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaInfo {
    /// Highest non-blank line ordinal processed.
    pub total_lines: u64,
    pub valid_lines: u64,
    pub error_lines: u64,
    pub field_names: HashSet<String>,
    pub field_counts: HashMap<String, u64>,
    pub field_type_histogram: HashMap<String, HashMap<TypeTag, u64>>,
}

/// Per-field row of the schema view.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSummary {
    pub name: String,
    pub count: u64,
    pub coverage: f64,
    /// Up to three most common types, most frequent first.
    pub top_types: Vec<(TypeTag, u64)>,
}

impl FieldSummary {
    pub fn types_label(&self) -> String {
        self.top_types
            .iter()
            .map(|(tag, count)| format!("{}({})", tag, count))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl SchemaInfo {
    pub fn sorted_field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.field_names.iter().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn field_count(&self, field: &str) -> u64 {
        self.field_counts.get(field).copied().unwrap_or(0)
    }

    /// Percentage of valid records containing `field`.
    pub fn coverage(&self, field: &str) -> f64 {
        if self.valid_lines == 0 {
            return 0.0;
        }
        self.field_count(field) as f64 / self.valid_lines as f64 * 100.0
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_lines == 0 {
            return 0.0;
        }
        self.valid_lines as f64 / self.total_lines as f64 * 100.0
    }

    pub fn field_summaries(&self) -> Vec<FieldSummary> {
        self.sorted_field_names()
            .into_iter()
            .map(|name| {
                let mut top_types: Vec<(TypeTag, u64)> = self
                    .field_type_histogram
                    .get(&name)
                    .map(|h| h.iter().map(|(tag, count)| (*tag, *count)).collect())
                    .unwrap_or_default();
                top_types.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
                top_types.truncate(3);

                FieldSummary {
                    count: self.field_count(&name),
                    coverage: self.coverage(&name),
                    top_types,
                    name,
                }
            })
            .collect()
    }

    /// Plain-text statistics page.
    pub fn report(&self, file_name: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "JSONL File Statistics");
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out);
        let _ = writeln!(out, "File: {}", file_name);
        let _ = writeln!(out);
        let _ = writeln!(out, "Records:");
        let _ = writeln!(out, "  Total Lines: {}", self.total_lines);
        let _ = writeln!(out, "  Valid Records: {}", self.valid_lines);
        let _ = writeln!(out, "  Parse Errors: {}", self.error_lines);
        let _ = writeln!(out, "  Success Rate: {:.2}%", self.success_rate());
        let _ = writeln!(out);
        let _ = writeln!(out, "Schema:");
        let _ = writeln!(out, "  Unique Fields: {}", self.field_names.len());
        let _ = writeln!(out);
        let _ = writeln!(out, "Field Coverage:");
        for name in self.sorted_field_names() {
            let _ = writeln!(
                out,
                "  {:30}: {:8} ({:5.1}%)",
                name,
                self.field_count(&name),
                self.coverage(&name)
            );
        }
        out
    }
}

/// Accumulates field statistics one object record at a time.
#[derive(Debug, Default)]
pub struct SchemaAggregator {
    info: SchemaInfo,
}

impl SchemaAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, object: &Map<String, Value>) {
        for (key, value) in object {
            if !self.info.field_names.contains(key) {
                self.info.field_names.insert(key.clone());
            }
            *self.info.field_counts.entry(key.clone()).or_insert(0) += 1;
            *self
                .info
                .field_type_histogram
                .entry(key.clone())
                .or_default()
                .entry(TypeTag::of(value))
                .or_insert(0) += 1;
        }
    }

    pub fn record_valid(&mut self, line_number: u64) {
        self.info.total_lines = line_number;
        self.info.valid_lines += 1;
    }

    pub fn record_error(&mut self, line_number: u64) {
        self.info.total_lines = line_number;
        self.info.error_lines += 1;
    }

    pub fn info(&self) -> &SchemaInfo {
        &self.info
    }

    pub fn finish(self) -> SchemaInfo {
        self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn observe_all(values: &[Value]) -> SchemaInfo {
        let mut agg = SchemaAggregator::new();
        for (i, value) in values.iter().enumerate() {
            agg.record_valid(i as u64 + 1);
            if let Value::Object(map) = value {
                agg.observe(map);
            }
        }
        agg.finish()
    }

    #[test]
    fn distinguishes_integer_and_float() {
        assert_eq!(TypeTag::of(&json!(1)), TypeTag::Integer);
        assert_eq!(TypeTag::of(&json!(-3)), TypeTag::Integer);
        assert_eq!(TypeTag::of(&json!(u64::MAX)), TypeTag::Integer);
        assert_eq!(TypeTag::of(&json!(1.0)), TypeTag::Float);
        assert_eq!(TypeTag::of(&json!(null)), TypeTag::Null);
        assert_eq!(TypeTag::of(&json!({})), TypeTag::Object);
    }

    #[test]
    fn integers_beyond_64_bits_stay_integers() {
        let info = observe_all(&[
            serde_json::from_str(r#"{"n": 123456789012345678901234567890}"#).unwrap(),
            serde_json::from_str(r#"{"n": -9223372036854775809}"#).unwrap(),
            serde_json::from_str(r#"{"n": 1.5e3}"#).unwrap(),
            serde_json::from_str(r#"{"n": 2.0}"#).unwrap(),
        ]);

        assert_eq!(
            info.field_type_histogram["n"],
            HashMap::from([(TypeTag::Integer, 2), (TypeTag::Float, 2)])
        );
        assert_eq!(TypeTag::Float.to_string(), "floating-point");
    }

    #[test]
    fn histogram_sums_match_field_counts() {
        let info = observe_all(&[
            json!({"a": 1, "b": "x"}),
            json!({"a": 2.5, "b": null}),
            json!({"a": "three"}),
            json!([1, 2, 3]),
        ]);

        assert_eq!(info.valid_lines, 4);
        for name in &info.field_names {
            let sum: u64 = info.field_type_histogram[name].values().sum();
            assert_eq!(sum, info.field_counts[name]);
            assert!(info.field_counts[name] <= info.valid_lines);
        }
        assert_eq!(info.field_count("a"), 3);
        assert_eq!(info.field_type_histogram["a"][&TypeTag::Float], 1);
    }

    #[test]
    fn non_objects_do_not_contribute_fields() {
        let info = observe_all(&[json!([1]), json!("s"), json!(3)]);
        assert_eq!(info.valid_lines, 3);
        assert!(info.field_names.is_empty());
        assert!(info.field_counts.is_empty());
    }

    #[test]
    fn summaries_sorted_with_top_three_types() {
        let info = observe_all(&[
            json!({"z": 1, "m": 1}),
            json!({"z": "s"}),
            json!({"z": "t"}),
            json!({"z": null}),
            json!({"z": true}),
        ]);

        let summaries = info.field_summaries();
        let names: Vec<&str> = summaries.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["m", "z"]);

        let z = &summaries[1];
        assert_eq!(z.count, 5);
        assert_eq!(z.coverage, 100.0);
        assert_eq!(z.top_types.len(), 3);
        assert_eq!(z.top_types[0], (TypeTag::String, 2));
        assert!((summaries[0].coverage - 20.0).abs() < 1e-9);
        assert_eq!(summaries[0].types_label(), "integer(1)");
    }

    #[test]
    fn rates_are_zero_without_lines() {
        let info = SchemaInfo::default();
        assert_eq!(info.success_rate(), 0.0);
        assert_eq!(info.coverage("missing"), 0.0);
    }

    #[test]
    fn report_lists_counts_and_coverage() {
        let mut agg = SchemaAggregator::new();
        agg.record_valid(1);
        agg.observe(json!({"a": 1}).as_object().unwrap());
        agg.record_error(2);
        let report = agg.finish().report("data.jsonl");

        assert!(report.contains("File: data.jsonl"));
        assert!(report.contains("Total Lines: 2"));
        assert!(report.contains("Parse Errors: 1"));
        assert!(report.contains("Success Rate: 50.00%"));
        assert!(report.contains("Unique Fields: 1"));
        assert!(report.contains("100.0%"));
    }
}
