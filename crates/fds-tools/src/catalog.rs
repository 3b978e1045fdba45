//! The fixed catalog of analytics operations.
//!
//! Built once at process start and shared read-only behind an `Arc`; it is
//! never mutated afterwards, so no synchronization is needed.

use serde_json::{json, Value};

use crate::types::{Operation, ParamSpec, ParamType};

/// Registry of named analytics operations with typed parameter schemas.
#[derive(Debug, Clone)]
pub struct Catalog {
    ops: Vec<Operation>,
}

const DATE_DESC: &str = "Date in YYYY-MM-DD format";

fn date(name: &'static str, required: bool) -> ParamSpec {
    ParamSpec {
        name,
        required,
        ty: ParamType::Date,
        description: DATE_DESC,
    }
}

fn category(required: bool) -> ParamSpec {
    ParamSpec {
        name: "category",
        required,
        ty: ParamType::Text,
        description: "Category filter; primary categories are parenthesized, e.g. (Sushi)",
    }
}

impl Catalog {
    /// Build the restaurant analytics catalog: the 8 operations exposed by
    /// the external tool server.
    pub fn analytics() -> Self {
        let ops = vec![
            Operation {
                name: "show_daily_sales",
                description: "Daily sales breakdown for a date range",
                params: vec![date("startDate", true), date("endDate", true), category(false)],
                exclusive: &[],
            },
            Operation {
                name: "show_top_items",
                description: "Top N best-selling items by revenue",
                params: vec![
                    ParamSpec {
                        name: "limit",
                        required: true,
                        ty: ParamType::Integer { min: 1, max: 1000 },
                        description: "Number of items to return",
                    },
                    date("startDate", true),
                    date("endDate", true),
                    category(false),
                ],
                exclusive: &[],
            },
            Operation {
                name: "show_category_breakdown",
                description: "Sales grouped by primary category",
                params: vec![
                    date("startDate", true),
                    date("endDate", true),
                    ParamSpec {
                        name: "includeBeer",
                        required: false,
                        ty: ParamType::Boolean,
                        description: "Include the (Beer) category (default true)",
                    },
                ],
                exclusive: &[],
            },
            Operation {
                name: "get_total_sales",
                description: "Total sales for a period as a single aggregate",
                params: vec![date("startDate", true), date("endDate", true), category(false)],
                exclusive: &[],
            },
            Operation {
                name: "find_peak_day",
                description: "Find the highest or lowest sales day in a range",
                params: vec![
                    date("startDate", true),
                    date("endDate", true),
                    ParamSpec {
                        name: "type",
                        required: true,
                        ty: ParamType::Enum(&["highest", "lowest"]),
                        description: "Whether to find the highest or lowest day",
                    },
                    category(false),
                ],
                exclusive: &[],
            },
            Operation {
                name: "compare_day_types",
                description: "Compare sales across day types",
                params: vec![
                    date("startDate", true),
                    date("endDate", true),
                    ParamSpec {
                        name: "comparison",
                        required: true,
                        ty: ParamType::Enum(&["weekday_vs_weekend", "by_day_of_week"]),
                        description: "Comparison grouping",
                    },
                    category(false),
                ],
                exclusive: &[],
            },
            Operation {
                name: "track_item_performance",
                description: "Track one menu item over time (item name matching is fuzzy)",
                params: vec![
                    ParamSpec {
                        name: "itemName",
                        required: true,
                        ty: ParamType::Text,
                        description: "Menu item name, e.g. Salmon Roll",
                    },
                    date("startDate", true),
                    date("endDate", true),
                ],
                exclusive: &[],
            },
            Operation {
                name: "compare_periods",
                description: "Compare sales between two time periods",
                params: vec![
                    date("startDate1", true),
                    date("endDate1", true),
                    date("startDate2", true),
                    date("endDate2", true),
                    category(false),
                    ParamSpec {
                        name: "itemName",
                        required: false,
                        ty: ParamType::Text,
                        description: "Menu item filter",
                    },
                ],
                exclusive: &[["category", "itemName"]],
            },
        ];
        Self { ops }
    }

    /// Look up an operation by exact name. Operation selection is always an
    /// exact match; there is no fuzzy matching at the catalog level.
    pub fn lookup(&self, name: &str) -> Option<&Operation> {
        self.ops.iter().find(|op| op.name == name)
    }

    /// All operations in declaration order.
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Function declarations advertised to the model, one per operation,
    /// in the OpenAI-compatible tools format.
    pub fn function_declarations(&self) -> Vec<Value> {
        self.ops
            .iter()
            .map(|op| {
                json!({
                    "type": "function",
                    "function": {
                        "name": op.name,
                        "description": op.description,
                        "parameters": op.json_schema(),
                    },
                })
            })
            .collect()
    }
}
