//! System prompt construction.
//!
//! Renders the operation catalog and the operator guidance into the system
//! instructions given to the model on every consultation.

use fds_tools::{Catalog, Operation};

/// Build the system prompt from the catalog and the configured tenant.
pub fn system_prompt(catalog: &Catalog, tenant_id: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are an AI assistant for restaurant sales analytics. You answer \
         questions by calling the analytics tools listed below, then present \
         the results in a clear, conversational way.\n\nAvailable tools:\n",
    );

    for op in catalog.operations() {
        prompt.push_str(&render_operation(op));
    }

    prompt.push_str(&format!(
        "\nGuidelines:\n\
         - All data belongs to tenant '{}'; the tenant is set automatically.\n\
         - All dates use the YYYY-MM-DD format, e.g. 2025-05-01.\n\
         - Primary category names are parenthesized: (Beer), (Sushi), (Food), \
         (Liquor), (Wine), (N/A Beverages). Subcategories are not: Bottle Beer, \
         Draft Beer, Signature Rolls.\n\
         - If the user names no time period, ask for one before calling a tool.\n\
         - When a result includes a chart URL, mention it to the user.\n\
         - If no data is found, suggest an alternative query.\n\
         - If a tool fails, explain it in simple terms; never show raw errors.\n",
        tenant_id
    ));

    prompt
}

fn render_operation(op: &Operation) -> String {
    let required: Vec<&str> = op
        .params
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name)
        .collect();
    let optional: Vec<&str> = op
        .params
        .iter()
        .filter(|p| !p.required)
        .map(|p| p.name)
        .collect();

    let mut line = format!("- {}: {}", op.name, op.description);
    if !required.is_empty() {
        line.push_str(&format!(" (required: {}", required.join(", ")));
        if !optional.is_empty() {
            line.push_str(&format!("; optional: {}", optional.join(", ")));
        }
        line.push(')');
    }
    line.push('\n');
    line
}
