/// Arrow schema definitions for the persisted law index.
pub mod index {
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    pub const UNIT_ID: &str = "unit_id";
    pub const LAW_TITLE: &str = "law_title";
    pub const ARTICLE_NUMBER: &str = "article_number";
    pub const PART: &str = "part";
    pub const TEXT: &str = "text";
    pub const EMBEDDING: &str = "embedding";

    /// Schema for one indexed unit per row, with a fixed-width embedding column.
    pub fn unit_index_schema(dims: usize) -> Schema {
        Schema::new(vec![
            Field::new(UNIT_ID, DataType::Utf8, false),
            Field::new(LAW_TITLE, DataType::Utf8, false),
            Field::new(ARTICLE_NUMBER, DataType::Utf8, false),
            Field::new(PART, DataType::UInt32, false),
            Field::new(TEXT, DataType::Utf8, false),
            Field::new(
                EMBEDDING,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dims as i32,
                ),
                false,
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::index;
    use arrow::datatypes::DataType;

    #[test]
    fn unit_index_schema_has_expected_fields() {
        let schema = index::unit_index_schema(384);
        assert_eq!(schema.fields().len(), 6);
        assert!(schema.field_with_name("unit_id").is_ok());
        assert!(schema.field_with_name("law_title").is_ok());
    }

    #[test]
    fn embedding_width_follows_dims() {
        let schema = index::unit_index_schema(1536);
        let field = schema.field_with_name("embedding").unwrap();
        assert!(matches!(field.data_type(), DataType::FixedSizeList(_, 1536)));
    }
}
