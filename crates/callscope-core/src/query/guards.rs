//! Shared guardrails for query payload bounds and traversal limits.

pub const MAX_QUERY_LENGTH: usize = 512;
pub const MAX_SEARCH_LIMIT: usize = 100;
pub const MAX_REFERENCE_DEPTH: usize = 6;
pub const MAX_CHAIN_DEPTH: usize = 8;
pub const MAX_GRAPH_VISITED: usize = 2000;
pub const MAX_GRAPH_EDGES: usize = 5000;
pub const MAX_STRUCTURE_TOKEN_BUDGET: usize = 32000;
pub const MIN_STRUCTURE_TOKEN_BUDGET: usize = 1;

pub fn clamp_int(value: usize, minimum: usize, maximum: usize) -> usize {
    value.max(minimum).min(maximum)
}

pub fn clamp_depth(value: usize, maximum: usize) -> usize {
    clamp_int(value, 1, maximum)
}

pub fn clamp_budget(value: usize) -> usize {
    clamp_int(value, MIN_STRUCTURE_TOKEN_BUDGET, MAX_STRUCTURE_TOKEN_BUDGET)
}

pub fn clamp_limit(value: usize, maximum: usize) -> usize {
    clamp_int(value, 1, maximum)
}

/// Trim a query and cap it at [`MAX_QUERY_LENGTH`] characters.
pub fn truncate_query(query: &str) -> String {
    query.trim().chars().take(MAX_QUERY_LENGTH).collect()
}

/// Visited-node cap scaled to graph size: a fifth of the functions, never
/// below `floor` and never above `base_cap`.
pub fn adaptive_graph_cap(total_functions: usize, base_cap: usize, floor: usize) -> usize {
    let estimated = floor.max((total_functions.max(1) as f64 * 0.2) as usize);
    clamp_int(estimated, floor, base_cap)
}
