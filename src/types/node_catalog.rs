//! Fixed, ordered catalog of the workflow's known stages.
//!
//! The catalog is advisory: it orders nodes for display and sizes `metrics.nodes_total`, but
//! events naming other nodes are tracked all the same.

/// One known stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogNode {
  pub id: &'static str,
  pub label: &'static str,
  pub description: &'static str,
}

/// Known stages in graph order.
pub const NODE_CATALOG: &[CatalogNode] = &[
  CatalogNode {
    id: "entry",
    label: "Entry",
    description: "Initialize state and memory",
  },
  CatalogNode {
    id: "specialist_agent",
    label: "Specialists",
    description: "Parallel specialist agents",
  },
  CatalogNode {
    id: "refiner",
    label: "Refiner",
    description: "Synthesize specialist outputs",
  },
  CatalogNode {
    id: "critique",
    label: "Critique",
    description: "Constitutional review",
  },
  CatalogNode {
    id: "judge",
    label: "Judge",
    description: "Score and provide feedback",
  },
  CatalogNode {
    id: "reflection",
    label: "Reflection",
    description: "Extract learnings",
  },
  CatalogNode {
    id: "consensus",
    label: "Consensus",
    description: "Multi-role debate voting",
  },
  CatalogNode {
    id: "meta_learning",
    label: "Meta Learning",
    description: "Adapt strategy weights",
  },
  CatalogNode {
    id: "memory_evolution",
    label: "Memory Evolution",
    description: "Evolve memory structure",
  },
  CatalogNode {
    id: "loop_decision",
    label: "Loop Decision",
    description: "Continue or finalize",
  },
  CatalogNode {
    id: "self_healing",
    label: "Self Healing",
    description: "Recover failed agents",
  },
  CatalogNode {
    id: "diagram",
    label: "Diagram",
    description: "Generate final output",
  },
];

/// Directed edges between catalog stages.
pub const CATALOG_EDGES: &[(&str, &str)] = &[
  ("entry", "specialist_agent"),
  ("specialist_agent", "refiner"),
  ("refiner", "critique"),
  ("critique", "judge"),
  ("judge", "reflection"),
  ("reflection", "consensus"),
  ("consensus", "meta_learning"),
  ("meta_learning", "memory_evolution"),
  ("memory_evolution", "loop_decision"),
  ("memory_evolution", "diagram"),
  ("loop_decision", "specialist_agent"),
  ("loop_decision", "self_healing"),
  ("self_healing", "specialist_agent"),
];

/// Looks up a stage by id.
pub fn catalog_node(id: &str) -> Option<&'static CatalogNode> {
  NODE_CATALOG.iter().find(|n| n.id == id)
}

/// Display position of `id`: catalog index, or `None` for nodes outside the catalog.
pub fn catalog_position(id: &str) -> Option<usize> {
  NODE_CATALOG.iter().position(|n| n.id == id)
}
