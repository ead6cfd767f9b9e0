//! Parameterized SQL filter building, grounded on the teacher's pattern of
//! accumulating a `Vec<Box<dyn ToSql>>` alongside a WHERE clause rather
//! than ever string-interpolating a value (§4.6: "never string-interpolate
//! user input").

use rusqlite::ToSql;

#[derive(Default)]
pub struct FilterBuilder {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, json_path: &str, value: impl ToSql + 'static) -> Self {
        self.clauses.push(format!("json_extract(metadata_json, '$.{json_path}') = ?"));
        self.params.push(Box::new(value));
        self
    }

    pub fn gte(mut self, json_path: &str, value: impl ToSql + 'static) -> Self {
        self.clauses.push(format!("json_extract(metadata_json, '$.{json_path}') >= ?"));
        self.params.push(Box::new(value));
        self
    }

    pub fn gt(mut self, raw_column: &str, value: impl ToSql + 'static) -> Self {
        self.clauses.push(format!("{raw_column} > ?"));
        self.params.push(Box::new(value));
        self
    }

    pub fn lt(mut self, raw_column: &str, value: impl ToSql + 'static) -> Self {
        self.clauses.push(format!("{raw_column} < ?"));
        self.params.push(Box::new(value));
        self
    }

    pub fn build(self) -> (String, Vec<Box<dyn ToSql>>) {
        if self.clauses.is_empty() {
            ("1=1".to_string(), self.params)
        } else {
            (self.clauses.join(" AND "), self.params)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_builder_matches_everything() {
        let (clause, params) = FilterBuilder::new().build();
        assert_eq!(clause, "1=1");
        assert!(params.is_empty());
    }

    #[test]
    fn clauses_join_with_and() {
        let (clause, params) = FilterBuilder::new()
            .eq("namespace", "default".to_string())
            .gte("importance_score", 0.5)
            .build();
        assert!(clause.contains("AND"));
        assert_eq!(params.len(), 2);
    }
}
