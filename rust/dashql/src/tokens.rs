//! `%%NAME%%` token substitution for generated and hand-written SQL.

use crate::model::DashboardParam;

/// Replaces `%%NAME%%` tokens with the matching parameter values. A missing
/// query stays missing.
///
/// Parameters are applied in slice order with no de-duplication, so when two
/// parameters share a name the first one consumes every occurrence.
pub fn replace_tokens(query: Option<&str>, params: &[DashboardParam]) -> Option<String> {
    query.map(|query| substitute_tokens(query, params))
}

pub fn substitute_tokens(query: &str, params: &[DashboardParam]) -> String {
    params.iter().fold(query.to_string(), |sql, param| {
        sql.replace(&token_for(&param.name), &param.value.to_string())
    })
}

fn token_for(name: &str) -> String {
    format!("%%{name}%%")
}
