//! Project document tree.
//!
//! The document is owned by the client application; the server only models
//! the fields it has to address or edit. Anything else a client attaches to
//! a project, product line, model or cell lands in the flattened `extra` map
//! and survives a load → mutate → persist cycle untouched.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Unmodelled fields carried through verbatim.
pub type Extra = Map<String, Value>;

/// Reads an explicit `null` as the type's default, like a missing field.
///
/// Use together with `#[serde(default)]`.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Root aggregate: one project per workspace at a time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub product_lines: Vec<ProductLine>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Project {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            product_lines: Vec::new(),
            extra: Extra::new(),
        }
    }

    pub fn product_line(&self, id: &str) -> Option<&ProductLine> {
        self.product_lines.iter().find(|pl| pl.id == id)
    }

    pub fn product_line_mut(&mut self, id: &str) -> Option<&mut ProductLine> {
        self.product_lines.iter_mut().find(|pl| pl.id == id)
    }

    /// Every model of every product line, in document order.
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.product_lines
            .iter()
            .flat_map(|pl| pl.domain_engineering.models.iter())
    }

    pub fn models_mut(&mut self) -> impl Iterator<Item = &mut Model> {
        self.product_lines
            .iter_mut()
            .flat_map(|pl| pl.domain_engineering.models.iter_mut())
    }

    /// First model with the given id, searching all product lines.
    pub fn find_model_mut(&mut self, model_id: &str) -> Option<&mut Model> {
        self.models_mut().find(|m| m.id == model_id)
    }

    pub fn find_cell(&self, cell_id: &str) -> Option<&Cell> {
        self.models()
            .flat_map(|m| m.cells.iter())
            .find(|c| c.id == cell_id)
    }

    pub fn find_cell_mut(&mut self, cell_id: &str) -> Option<&mut Cell> {
        self.models_mut()
            .flat_map(|m| m.cells.iter_mut())
            .find(|c| c.id == cell_id)
    }

    pub fn find_edge(&self, edge_id: &str) -> Option<&Connection> {
        self.models()
            .flat_map(|m| m.connections.iter())
            .find(|e| e.id == edge_id)
    }

    pub fn find_edge_mut(&mut self, edge_id: &str) -> Option<&mut Connection> {
        self.models_mut()
            .flat_map(|m| m.connections.iter_mut())
            .find(|e| e.id == edge_id)
    }
}

/// Identifying fields of a product line, as sent by `productLineCreated`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProductLineHeader {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductLine {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub domain_engineering: DomainEngineering,
    #[serde(flatten)]
    pub extra: Extra,
}

impl ProductLine {
    /// A product line with an empty domain-engineering block.
    pub fn from_header(header: &ProductLineHeader) -> Self {
        Self {
            id: header.id.clone(),
            name: header.name.clone(),
            kind: header.kind.clone(),
            domain: header.domain.clone(),
            domain_engineering: DomainEngineering::default(),
            extra: Extra::new(),
        }
    }

    pub fn model(&self, id: &str) -> Option<&Model> {
        self.domain_engineering.models.iter().find(|m| m.id == id)
    }

    pub fn model_mut(&mut self, id: &str) -> Option<&mut Model> {
        self.domain_engineering.models.iter_mut().find(|m| m.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DomainEngineering {
    #[serde(default)]
    pub models: Vec<Model>,
    #[serde(default)]
    pub relationships: Vec<Value>,
    #[serde(default)]
    pub constraints: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Identifying fields of a model, as sent by `modelCreated`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelHeader {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "elements", default)]
    pub cells: Vec<Cell>,
    #[serde(rename = "relationships", default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub constraints: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Model {
    /// An empty model: no cells, no connections, no constraints.
    pub fn from_header(header: &ModelHeader) -> Self {
        Self {
            id: header.id.clone(),
            name: header.name.clone(),
            kind: header.kind.clone(),
            ..Self::default()
        }
    }

    pub fn cell(&self, id: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id == id)
    }
}

/// A diagram element. Geometry is stored flat, the way the editor sends it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub style: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: Vec<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Cell {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn with_bounds(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.x = x;
        self.y = y;
        self.width = width;
        self.height = height;
        self
    }

    /// The stored form of an incoming cell: modelled fields only.
    pub fn normalized(&self) -> Cell {
        Cell {
            extra: Extra::new(),
            ..self.clone()
        }
    }
}

/// Edge between two cells of the same model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(default)]
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub style: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
}

impl Connection {
    /// Edge with the default id `"<source>-><target>"`.
    pub fn between(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        let source_id = source_id.into();
        let target_id = target_id.into();
        Self {
            id: Self::default_id(&source_id, &target_id),
            source_id,
            target_id,
            ..Self::default()
        }
    }

    pub fn default_id(source_id: &str, target_id: &str) -> String {
        format!("{source_id}->{target_id}")
    }
}

/// Partial geometry update. Absent fields keep their current value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeometryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl GeometryPatch {
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn size(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }
}
