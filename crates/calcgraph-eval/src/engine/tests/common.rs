//! Common test helpers
use crate::engine::{
    CellValueChange, ChangeAddress, Engine, EvalConfig, RawCellContent, Vertex, VertexKind,
};
use calcgraph_common::{CellAddress, LiteralValue, RangeAddress, SheetId};
use std::collections::BTreeMap;

/// Rows of typed-in text, `""` for an empty cell.
pub fn raw_rows(rows: &[&[&str]]) -> Vec<Vec<RawCellContent>> {
    rows.iter()
        .map(|row| row.iter().map(|s| RawCellContent::from(*s)).collect())
        .collect()
}

pub fn build(rows: &[&[&str]]) -> (Engine, SheetId) {
    build_with(rows, EvalConfig::default())
}

/// Route engine spans to the test output; `RUST_LOG=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn build_with(rows: &[&[&str]], config: EvalConfig) -> (Engine, SheetId) {
    init_tracing();
    let engine = Engine::build_from_array(raw_rows(rows), config).unwrap();
    let sheet = engine.sheet_id("Sheet1").unwrap();
    (engine, sheet)
}

pub fn circular_config() -> EvalConfig {
    EvalConfig {
        allow_circular_references: true,
        ..EvalConfig::default()
    }
}

pub fn addr(sheet: SheetId, a1: &str) -> CellAddress {
    CellAddress::parse_a1(sheet, a1).unwrap()
}

pub fn range(sheet: SheetId, a1: &str) -> RangeAddress {
    RangeAddress::parse_a1(sheet, a1).unwrap()
}

pub fn value(engine: &Engine, sheet: SheetId, a1: &str) -> LiteralValue {
    engine.get_cell_value(&addr(sheet, a1)).unwrap()
}

pub fn number(engine: &Engine, sheet: SheetId, a1: &str) -> f64 {
    match value(engine, sheet, a1) {
        LiteralValue::Number(n) => n,
        other => panic!("{a1} is {other:?}, expected a number"),
    }
}

pub fn formula(engine: &Engine, sheet: SheetId, a1: &str) -> Option<String> {
    engine.get_cell_formula(&addr(sheet, a1)).unwrap()
}

pub fn is_error(engine: &Engine, sheet: SheetId, a1: &str, code: &str) -> bool {
    matches!(value(engine, sheet, a1), LiteralValue::Error(e) if e.kind.code() == code)
}

/// Changed cells, in order, with their new values.
pub fn changed_cells(changes: &[CellValueChange]) -> Vec<(CellAddress, LiteralValue)> {
    changes
        .iter()
        .filter_map(|c| match &c.address {
            ChangeAddress::Cell(a) => Some((*a, c.new_value.clone())),
            ChangeAddress::Named { .. } => None,
        })
        .collect()
}

/// Every invariant a caller can observe through the graph: edges only
/// join live vertices, and every empty or range vertex is read by
/// something other than a range.
pub fn assert_graph_consistent(engine: &Engine) {
    let graph = engine.graph();
    assert!(graph.check_edges(), "dangling edge");
    let read_by_formula = |id| {
        graph
            .dependents(id)
            .into_iter()
            .any(|d| !matches!(graph.vertex(d), Some(Vertex::Range(_))))
    };
    for (id, vertex) in graph.graph.iter() {
        if let Vertex::Empty(a) = vertex {
            assert!(read_by_formula(id), "orphan empty vertex at {a:?}");
        }
        if let Vertex::Range(r) = vertex {
            assert!(read_by_formula(id), "unread range vertex {:?}", r.range);
        }
    }
}

/// What undo and redo must reproduce exactly: vertices by kind, edges,
/// registered ranges and the serialized workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphShape {
    pub vertices: BTreeMap<VertexKind, usize>,
    pub edges: usize,
    pub ranges: usize,
    pub sheets: Vec<(String, Vec<Vec<RawCellContent>>)>,
}

pub fn shape(engine: &Engine) -> GraphShape {
    let graph = engine.graph();
    GraphShape {
        vertices: graph.census(),
        edges: graph.edge_count(),
        ranges: graph.ranges.len(),
        sheets: engine.get_all_sheets_serialized(),
    }
}
