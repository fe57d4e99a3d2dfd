/// Request and response bodies for the HTTP API
use crate::filter::Predicate;
use crate::view::ViewDefinition;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/views`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateViewRequest {
    pub name: String,
    pub table_id: String,
    pub field: String,
    #[serde(default)]
    pub calculation: Option<String>,
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub filters: Vec<Predicate>,
}

impl CreateViewRequest {
    /// Split into the target table and the definition to validate.
    pub fn into_definition(self) -> (String, ViewDefinition) {
        (
            self.table_id,
            ViewDefinition {
                name: self.name,
                field: self.field,
                calculation: self.calculation,
                group_by: self.group_by,
                filters: self.filters,
            },
        )
    }
}

/// Query string of `GET /api/views` and `DELETE /api/views/{name}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableQuery {
    #[serde(default)]
    pub table_id: Option<String>,
}

/// Query string of `GET /api/views/{name}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewQueryParams {
    #[serde(default)]
    pub calculation: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub table_id: Option<String>,
}

/// Plain `{ "message": ... }` body used for acknowledgements and errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        MessageResponse {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOperator;

    #[test]
    fn test_create_view_request_parsing() {
        let json = r#"{
            "name": "TestView",
            "tableId": "ta_sales",
            "field": "Price",
            "calculation": "stats",
            "groupBy": "Category",
            "filters": [{"field": "Price", "operator": "MT", "value": 100}]
        }"#;
        let request: CreateViewRequest = serde_json::from_str(json).unwrap();
        let (table_id, definition) = request.into_definition();
        assert_eq!(table_id, "ta_sales");
        assert_eq!(definition.calculation.as_deref(), Some("stats"));
        assert_eq!(definition.group_by.as_deref(), Some("Category"));
        assert_eq!(definition.filters[0].operator, FilterOperator::GreaterThan);
    }

    #[test]
    fn test_optional_fields_default() {
        let json = r#"{"name": "Rows", "tableId": "ta_sales", "field": "Price"}"#;
        let request: CreateViewRequest = serde_json::from_str(json).unwrap();
        assert!(request.calculation.is_none());
        assert!(request.filters.is_empty());
    }
}
