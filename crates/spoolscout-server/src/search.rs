//! Free-text matching over filament records.
//!
//! A query is split on whitespace; a record matches when every term occurs,
//! case-insensitively, in at least one of the searchable columns. A query made
//! only of whitespace is matched as a single literal substring.

use sea_orm::{
    Condition,
    sea_query::{Expr, Func, LikeExpr},
};
use spoolscout_db::entities::filaments;

use crate::models::Filament;

pub const SEARCH_COLUMNS: [filaments::Column; 6] = [
    filaments::Column::Name,
    filaments::Column::Material,
    filaments::Column::Color,
    filaments::Column::Brand,
    filaments::Column::Description,
    filaments::Column::Properties,
];

const LIKE_ESCAPE: char = '\\';

pub fn search_terms(query: &str) -> Vec<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    if terms.is_empty() && !query.is_empty() {
        return vec![query.to_string()];
    }
    terms
}

/// `%term%` with LIKE metacharacters escaped.
pub fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// SQL form of [`filament_matches`]. `terms` must already be lowercased.
pub fn search_condition(terms: &[String]) -> Condition {
    terms.iter().fold(Condition::all(), |all, term| {
        let pattern = like_pattern(term);
        let any = SEARCH_COLUMNS.iter().fold(Condition::any(), |any, col| {
            any.add(
                Expr::expr(Func::lower(Expr::col((filaments::Entity, *col))))
                    .like(LikeExpr::new(pattern.clone()).escape(LIKE_ESCAPE)),
            )
        });
        all.add(any)
    })
}

pub fn filament_matches(f: &Filament, terms: &[String]) -> bool {
    if terms.is_empty() {
        return false;
    }
    let fields: [Option<&str>; 6] = [
        Some(f.name.as_str()),
        Some(f.material.as_str()),
        Some(f.color.as_str()),
        f.brand.as_deref(),
        f.description.as_deref(),
        f.properties.as_deref(),
    ];
    let haystacks: Vec<String> = fields.into_iter().flatten().map(str::to_lowercase).collect();
    terms
        .iter()
        .all(|term| haystacks.iter().any(|h| h.contains(term.as_str())))
}
