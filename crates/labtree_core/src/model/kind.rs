//! Closed set of node kinds and their per-kind capability table.
//!
//! # Responsibility
//! - Identify what a node is without runtime type introspection.
//! - Provide the per-kind data (labels, element tags, icons, actions) that
//!   generic tree, serialization and projection code dispatch on.
//!
//! # Invariants
//! - `a.inherits(b)` holds iff every bit of `b` is set in `a`.
//! - `NodeKind::Aspect` has no bits, so every kind inherits from it.
//! - Element tags are unique across concrete kinds.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Kind of a tree node.
///
/// Discriminants are bit patterns: a kind inherits from every kind whose
/// pattern is a subset of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum NodeKind {
    /// Base of every kind; only useful as a filter.
    Aspect = 0,
    WorksheetElement = 0x020_0000,
    Axis = 0x021_0001,
    TextLabel = 0x021_0020,
    WorksheetElementContainer = 0x022_0000,
    CartesianPlot = 0x022_1001,
    XYCurve = 0x024_0000,
    Part = 0x040_0000,
    DataSource = 0x041_0000,
    Matrix = 0x041_1000,
    Spreadsheet = 0x041_2000,
    Note = 0x042_0008,
    Workbook = 0x042_0010,
    Worksheet = 0x042_0020,
    AbstractColumn = 0x100_0000,
    Column = 0x100_0001,
    Folder = 0x200_0000,
    Project = 0x200_0001,
}

/// Static per-kind data used by kind-agnostic machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindCapabilities {
    /// Stable internal type name.
    pub type_name: &'static str,
    /// Label shown in the projection `Type` column.
    pub type_label: &'static str,
    /// Element name used by the document format. `None` for abstract kinds.
    pub element_tag: Option<&'static str>,
    /// Icon theme name for decorating views.
    pub icon: &'static str,
    /// Context actions offered for nodes of this kind.
    pub context_actions: &'static [&'static str],
}

const COMMON_ACTIONS: &[&str] = &["rename", "delete", "move_up", "move_down"];
const FOLDER_ACTIONS: &[&str] = &[
    "new_folder",
    "new_spreadsheet",
    "new_matrix",
    "new_worksheet",
    "new_note",
    "rename",
    "delete",
];
const PROJECT_ACTIONS: &[&str] = &[
    "new_folder",
    "new_spreadsheet",
    "new_matrix",
    "new_worksheet",
    "new_note",
    "rename",
];
const SPREADSHEET_ACTIONS: &[&str] = &["add_column", "rename", "delete", "move_up", "move_down"];
const WORKSHEET_ACTIONS: &[&str] = &["add_plot", "add_text_label", "rename", "delete"];
const PLOT_ACTIONS: &[&str] = &["add_curve", "add_axis", "add_text_label", "rename", "delete"];

impl NodeKind {
    /// Every kind, abstract ones included.
    pub const ALL: [NodeKind; 18] = [
        NodeKind::Aspect,
        NodeKind::WorksheetElement,
        NodeKind::Axis,
        NodeKind::TextLabel,
        NodeKind::WorksheetElementContainer,
        NodeKind::CartesianPlot,
        NodeKind::XYCurve,
        NodeKind::Part,
        NodeKind::DataSource,
        NodeKind::Matrix,
        NodeKind::Spreadsheet,
        NodeKind::Note,
        NodeKind::Workbook,
        NodeKind::Worksheet,
        NodeKind::AbstractColumn,
        NodeKind::Column,
        NodeKind::Folder,
        NodeKind::Project,
    ];

    /// Raw bit pattern of this kind.
    pub fn bits(self) -> u32 {
        self as u32
    }

    /// Returns whether this kind is `base` or derives from it.
    pub fn inherits(self, base: NodeKind) -> bool {
        self.bits() & base.bits() == base.bits()
    }

    /// Returns whether nodes of this kind can be saved and loaded.
    pub fn is_concrete(self) -> bool {
        self.capabilities().element_tag.is_some()
    }

    /// Capability entry for this kind.
    pub fn capabilities(self) -> &'static KindCapabilities {
        match self {
            Self::Aspect => &ASPECT,
            Self::WorksheetElement => &WORKSHEET_ELEMENT,
            Self::Axis => &AXIS,
            Self::TextLabel => &TEXT_LABEL,
            Self::WorksheetElementContainer => &WORKSHEET_ELEMENT_CONTAINER,
            Self::CartesianPlot => &CARTESIAN_PLOT,
            Self::XYCurve => &XY_CURVE,
            Self::Part => &PART,
            Self::DataSource => &DATA_SOURCE,
            Self::Matrix => &MATRIX,
            Self::Spreadsheet => &SPREADSHEET,
            Self::Note => &NOTE,
            Self::Workbook => &WORKBOOK,
            Self::Worksheet => &WORKSHEET,
            Self::AbstractColumn => &ABSTRACT_COLUMN,
            Self::Column => &COLUMN,
            Self::Folder => &FOLDER,
            Self::Project => &PROJECT,
        }
    }

    /// Stable internal type name.
    pub fn type_name(self) -> &'static str {
        self.capabilities().type_name
    }

    /// Resolves a concrete kind from its document element tag.
    pub fn from_element_tag(tag: &str) -> Option<NodeKind> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.capabilities().element_tag == Some(tag))
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

const fn abstract_kind(type_name: &'static str) -> KindCapabilities {
    KindCapabilities {
        type_name,
        type_label: type_name,
        element_tag: None,
        icon: "",
        context_actions: &[],
    }
}

static ASPECT: KindCapabilities = abstract_kind("AbstractAspect");
static WORKSHEET_ELEMENT: KindCapabilities = abstract_kind("WorksheetElement");
static WORKSHEET_ELEMENT_CONTAINER: KindCapabilities = abstract_kind("WorksheetElementContainer");
static PART: KindCapabilities = abstract_kind("AbstractPart");
static DATA_SOURCE: KindCapabilities = abstract_kind("AbstractDataSource");
static ABSTRACT_COLUMN: KindCapabilities = abstract_kind("AbstractColumn");

static AXIS: KindCapabilities = KindCapabilities {
    type_name: "Axis",
    type_label: "Axis",
    element_tag: Some("axis"),
    icon: "labplot-axis-horizontal",
    context_actions: COMMON_ACTIONS,
};
static TEXT_LABEL: KindCapabilities = KindCapabilities {
    type_name: "TextLabel",
    type_label: "TextLabel",
    element_tag: Some("textLabel"),
    icon: "draw-text",
    context_actions: COMMON_ACTIONS,
};
static CARTESIAN_PLOT: KindCapabilities = KindCapabilities {
    type_name: "CartesianPlot",
    type_label: "Plot Area",
    element_tag: Some("cartesianPlot"),
    icon: "office-chart-line",
    context_actions: PLOT_ACTIONS,
};
static XY_CURVE: KindCapabilities = KindCapabilities {
    type_name: "XYCurve",
    type_label: "XYCurve",
    element_tag: Some("xyCurve"),
    icon: "labplot-xy-curve",
    context_actions: COMMON_ACTIONS,
};
static MATRIX: KindCapabilities = KindCapabilities {
    type_name: "Matrix",
    type_label: "Matrix",
    element_tag: Some("matrix"),
    icon: "labplot-matrix",
    context_actions: COMMON_ACTIONS,
};
static SPREADSHEET: KindCapabilities = KindCapabilities {
    type_name: "Spreadsheet",
    type_label: "Spreadsheet",
    element_tag: Some("spreadsheet"),
    icon: "labplot-spreadsheet",
    context_actions: SPREADSHEET_ACTIONS,
};
static NOTE: KindCapabilities = KindCapabilities {
    type_name: "Note",
    type_label: "Note",
    element_tag: Some("note"),
    icon: "document-new",
    context_actions: COMMON_ACTIONS,
};
static WORKBOOK: KindCapabilities = KindCapabilities {
    type_name: "Workbook",
    type_label: "Workbook",
    element_tag: Some("workbook"),
    icon: "labplot-workbook",
    context_actions: COMMON_ACTIONS,
};
static WORKSHEET: KindCapabilities = KindCapabilities {
    type_name: "Worksheet",
    type_label: "Worksheet",
    element_tag: Some("worksheet"),
    icon: "labplot-worksheet",
    context_actions: WORKSHEET_ACTIONS,
};
static COLUMN: KindCapabilities = KindCapabilities {
    type_name: "Column",
    type_label: "Column",
    element_tag: Some("column"),
    icon: "x-shape-text",
    context_actions: COMMON_ACTIONS,
};
static FOLDER: KindCapabilities = KindCapabilities {
    type_name: "Folder",
    type_label: "Folder",
    element_tag: Some("folder"),
    icon: "folder",
    context_actions: FOLDER_ACTIONS,
};
static PROJECT: KindCapabilities = KindCapabilities {
    type_name: "Project",
    type_label: "Project",
    element_tag: Some("project"),
    icon: "labplot",
    context_actions: PROJECT_ACTIONS,
};

/// Narrowing applied by filtered child enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildFilter {
    /// Only children inheriting from this kind are returned.
    pub kind: NodeKind,
    /// Include hidden children (and descend into them when recursive).
    pub include_hidden: bool,
    /// Walk the whole subtree in pre-order instead of direct children only.
    pub recursive: bool,
}

impl Default for ChildFilter {
    fn default() -> Self {
        Self {
            kind: NodeKind::Aspect,
            include_hidden: false,
            recursive: false,
        }
    }
}

impl ChildFilter {
    /// Visible direct children of any kind.
    pub fn visible() -> Self {
        Self::default()
    }

    /// Visible direct children inheriting from `kind`.
    pub fn of_kind(kind: NodeKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn including_hidden(mut self) -> Self {
        self.include_hidden = true;
        self
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{ChildFilter, NodeKind};

    #[test]
    fn every_kind_inherits_from_aspect() {
        for kind in NodeKind::ALL {
            assert!(kind.inherits(NodeKind::Aspect), "{kind} should inherit Aspect");
        }
    }

    #[test]
    fn inheritance_follows_bit_patterns() {
        assert!(NodeKind::Project.inherits(NodeKind::Folder));
        assert!(!NodeKind::Folder.inherits(NodeKind::Project));
        assert!(NodeKind::Spreadsheet.inherits(NodeKind::DataSource));
        assert!(NodeKind::Spreadsheet.inherits(NodeKind::Part));
        assert!(NodeKind::Worksheet.inherits(NodeKind::Part));
        assert!(!NodeKind::Worksheet.inherits(NodeKind::DataSource));
        assert!(NodeKind::CartesianPlot.inherits(NodeKind::WorksheetElementContainer));
        assert!(NodeKind::CartesianPlot.inherits(NodeKind::WorksheetElement));
        assert!(NodeKind::Column.inherits(NodeKind::AbstractColumn));
        assert!(!NodeKind::Column.inherits(NodeKind::Part));
    }

    #[test]
    fn element_tags_resolve_back_to_their_kind() {
        for kind in NodeKind::ALL.into_iter().filter(|kind| kind.is_concrete()) {
            let tag = kind.capabilities().element_tag.expect("concrete kind has tag");
            assert_eq!(NodeKind::from_element_tag(tag), Some(kind));
        }
        assert_eq!(NodeKind::from_element_tag("comment"), None);
    }

    #[test]
    fn cartesian_plot_uses_plot_area_label() {
        assert_eq!(NodeKind::CartesianPlot.capabilities().type_label, "Plot Area");
        assert_eq!(NodeKind::CartesianPlot.type_name(), "CartesianPlot");
    }

    #[test]
    fn child_filter_builders_compose() {
        let filter = ChildFilter::of_kind(NodeKind::Column)
            .including_hidden()
            .recursive();
        assert_eq!(filter.kind, NodeKind::Column);
        assert!(filter.include_hidden);
        assert!(filter.recursive);
        assert_eq!(ChildFilter::visible(), ChildFilter::default());
    }
}
