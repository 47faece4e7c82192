//! Document mutation engine.
//!
//! Every operation locates its target before writing anything, so a
//! `NotFound` failure leaves the project exactly as it was and the caller
//! can drop it without persisting. Operations are idempotent: applying the
//! same call twice yields the same project as applying it once.
//!
//! Edits arrive as [`Mutation`] values; the free functions are the
//! individual operations behind [`Mutation::apply`].

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::document::{
    Cell, Connection, GeometryPatch, Model, ModelHeader, ProductLine, ProductLineHeader, Project,
};

/// Kind of entity an operation failed to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    ProductLine,
    Model,
    Cell,
    Edge,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProductLine => write!(f, "Product line"),
            Self::Model => write!(f, "Model"),
            Self::Cell => write!(f, "Cell"),
            Self::Edge => write!(f, "Edge"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },
}

impl MutationError {
    fn not_found(kind: EntityKind, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// A single structured edit of a project.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateProductLine(ProductLineHeader),
    CreateModel {
        product_line_id: String,
        model: ModelHeader,
    },
    DeleteModel {
        product_line_id: String,
        model_id: String,
    },
    RenameModel {
        product_line_id: String,
        model_id: String,
        name: String,
    },
    ConfigureModel {
        product_line_id: String,
        model_id: String,
        configuration: Value,
    },
    MoveCell {
        cell_id: String,
        position: GeometryPatch,
    },
    ResizeCell {
        cell_id: String,
        size: GeometryPatch,
    },
    AddCells {
        model_id: String,
        cells: Vec<Cell>,
    },
    RemoveCells {
        cell_ids: Vec<String>,
    },
    ConnectCells {
        model_id: String,
        connection: Connection,
    },
    ChangeCellProperties {
        cell_id: String,
        properties: Vec<Value>,
    },
    ChangeEdgeStyle {
        edge_id: String,
        style: String,
    },
    ChangeEdgeLabel {
        edge_id: String,
        label: String,
    },
}

impl Mutation {
    /// Apply in place. On error the project is unchanged.
    pub fn apply(&self, project: &mut Project) -> Result<(), MutationError> {
        match self {
            Self::CreateProductLine(header) => {
                create_product_line(project, header);
                Ok(())
            }
            Self::CreateModel {
                product_line_id,
                model,
            } => create_model(project, product_line_id, model),
            Self::DeleteModel {
                product_line_id,
                model_id,
            } => delete_model(project, product_line_id, model_id),
            Self::RenameModel {
                product_line_id,
                model_id,
                name,
            } => rename_model(project, product_line_id, model_id, name),
            Self::ConfigureModel {
                product_line_id,
                model_id,
                configuration,
            } => configure_model(project, product_line_id, model_id, configuration.clone()),
            Self::MoveCell { cell_id, position } => move_cell(project, cell_id, position),
            Self::ResizeCell { cell_id, size } => resize_cell(project, cell_id, size),
            Self::AddCells { model_id, cells } => add_cells(project, model_id, cells),
            Self::RemoveCells { cell_ids } => {
                remove_cells(project, cell_ids);
                Ok(())
            }
            Self::ConnectCells {
                model_id,
                connection,
            } => connect_cells(project, model_id, connection.clone()),
            Self::ChangeCellProperties {
                cell_id,
                properties,
            } => change_cell_properties(project, cell_id, properties.clone()),
            Self::ChangeEdgeStyle { edge_id, style } => change_edge_style(project, edge_id, style),
            Self::ChangeEdgeLabel { edge_id, label } => change_edge_label(project, edge_id, label),
        }
    }

    /// Apply to a copy, leaving `project` untouched.
    pub fn applied_to(&self, project: &Project) -> Result<Project, MutationError> {
        let mut next = project.clone();
        self.apply(&mut next)?;
        Ok(next)
    }

    /// Short operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateProductLine(_) => "createProductLine",
            Self::CreateModel { .. } => "createModel",
            Self::DeleteModel { .. } => "deleteModel",
            Self::RenameModel { .. } => "renameModel",
            Self::ConfigureModel { .. } => "configureModel",
            Self::MoveCell { .. } => "moveCell",
            Self::ResizeCell { .. } => "resizeCell",
            Self::AddCells { .. } => "addCells",
            Self::RemoveCells { .. } => "removeCells",
            Self::ConnectCells { .. } => "connectCells",
            Self::ChangeCellProperties { .. } => "changeCellProperties",
            Self::ChangeEdgeStyle { .. } => "changeEdgeStyle",
            Self::ChangeEdgeLabel { .. } => "changeEdgeLabel",
        }
    }
}

// ─── Product lines & models ──────────────────────────────────────────

/// Append a product line with an empty domain-engineering block.
/// An existing id is left as is.
pub fn create_product_line(project: &mut Project, header: &ProductLineHeader) {
    if project.product_line(&header.id).is_some() {
        log::debug!("Product line {} already exists", header.id);
        return;
    }
    project.product_lines.push(ProductLine::from_header(header));
}

/// Append an empty model to a product line. An existing id is left as is.
pub fn create_model(
    project: &mut Project,
    product_line_id: &str,
    header: &ModelHeader,
) -> Result<(), MutationError> {
    let product_line = project
        .product_line_mut(product_line_id)
        .ok_or_else(|| MutationError::not_found(EntityKind::ProductLine, product_line_id))?;

    if product_line.model(&header.id).is_some() {
        log::debug!("Model {} already exists in {product_line_id}", header.id);
        return Ok(());
    }
    product_line
        .domain_engineering
        .models
        .push(Model::from_header(header));
    Ok(())
}

pub fn delete_model(
    project: &mut Project,
    product_line_id: &str,
    model_id: &str,
) -> Result<(), MutationError> {
    let product_line = project
        .product_line_mut(product_line_id)
        .ok_or_else(|| MutationError::not_found(EntityKind::ProductLine, product_line_id))?;

    if product_line.model(model_id).is_none() {
        return Err(MutationError::not_found(EntityKind::Model, model_id));
    }
    product_line
        .domain_engineering
        .models
        .retain(|m| m.id != model_id);
    Ok(())
}

pub fn rename_model(
    project: &mut Project,
    product_line_id: &str,
    model_id: &str,
    name: &str,
) -> Result<(), MutationError> {
    locate_model(project, product_line_id, model_id)?.name = name.to_string();
    Ok(())
}

pub fn configure_model(
    project: &mut Project,
    product_line_id: &str,
    model_id: &str,
    configuration: Value,
) -> Result<(), MutationError> {
    locate_model(project, product_line_id, model_id)?.configuration = Some(configuration);
    Ok(())
}

fn locate_model<'a>(
    project: &'a mut Project,
    product_line_id: &str,
    model_id: &str,
) -> Result<&'a mut Model, MutationError> {
    project
        .product_line_mut(product_line_id)
        .ok_or_else(|| MutationError::not_found(EntityKind::ProductLine, product_line_id))?
        .model_mut(model_id)
        .ok_or_else(|| MutationError::not_found(EntityKind::Model, model_id))
}

// ─── Cells ───────────────────────────────────────────────────────────

/// Update `x`/`y` of a cell wherever it lives. Other patch fields are ignored.
pub fn move_cell(
    project: &mut Project,
    cell_id: &str,
    position: &GeometryPatch,
) -> Result<(), MutationError> {
    let cell = project
        .find_cell_mut(cell_id)
        .ok_or_else(|| MutationError::not_found(EntityKind::Cell, cell_id))?;

    if let Some(x) = position.x {
        cell.x = x;
    }
    if let Some(y) = position.y {
        cell.y = y;
    }
    Ok(())
}

/// Update the geometry of a cell. Resizing from a leading handle also
/// moves the origin, so `x`/`y` are honoured when present.
pub fn resize_cell(
    project: &mut Project,
    cell_id: &str,
    size: &GeometryPatch,
) -> Result<(), MutationError> {
    let cell = project
        .find_cell_mut(cell_id)
        .ok_or_else(|| MutationError::not_found(EntityKind::Cell, cell_id))?;

    if let Some(width) = size.width {
        cell.width = width;
    }
    if let Some(height) = size.height {
        cell.height = height;
    }
    if let Some(x) = size.x {
        cell.x = x;
    }
    if let Some(y) = size.y {
        cell.y = y;
    }
    Ok(())
}

/// Append normalized cells to a model. A cell whose id is already present
/// replaces the stored one in place.
pub fn add_cells(
    project: &mut Project,
    model_id: &str,
    cells: &[Cell],
) -> Result<(), MutationError> {
    let model = project
        .find_model_mut(model_id)
        .ok_or_else(|| MutationError::not_found(EntityKind::Model, model_id))?;

    for cell in cells {
        let cell = cell.normalized();
        match model.cells.iter_mut().find(|c| c.id == cell.id) {
            Some(existing) => *existing = cell,
            None => model.cells.push(cell),
        }
    }
    Ok(())
}

/// Remove every cell (and every edge, which the editor also addresses as a
/// cell) whose id is in `cell_ids`. Returns how many records were dropped.
pub fn remove_cells(project: &mut Project, cell_ids: &[String]) -> usize {
    let ids: HashSet<&str> = cell_ids.iter().map(String::as_str).collect();
    let mut removed = 0;

    for model in project.models_mut() {
        let before = model.cells.len() + model.connections.len();
        model.cells.retain(|c| !ids.contains(c.id.as_str()));
        model.connections.retain(|e| !ids.contains(e.id.as_str()));
        removed += before - model.cells.len() - model.connections.len();
    }
    removed
}

pub fn change_cell_properties(
    project: &mut Project,
    cell_id: &str,
    properties: Vec<Value>,
) -> Result<(), MutationError> {
    project
        .find_cell_mut(cell_id)
        .ok_or_else(|| MutationError::not_found(EntityKind::Cell, cell_id))?
        .properties = properties;
    Ok(())
}

// ─── Edges ───────────────────────────────────────────────────────────

/// Append an edge to a model. Source and target are not checked against
/// the model's cells. An edge with the same id replaces the stored one.
pub fn connect_cells(
    project: &mut Project,
    model_id: &str,
    mut connection: Connection,
) -> Result<(), MutationError> {
    let model = project
        .find_model_mut(model_id)
        .ok_or_else(|| MutationError::not_found(EntityKind::Model, model_id))?;

    if connection.id.is_empty() {
        connection.id = Connection::default_id(&connection.source_id, &connection.target_id);
    }
    match model.connections.iter_mut().find(|e| e.id == connection.id) {
        Some(existing) => *existing = connection,
        None => model.connections.push(connection),
    }
    Ok(())
}

pub fn change_edge_style(
    project: &mut Project,
    edge_id: &str,
    style: &str,
) -> Result<(), MutationError> {
    project
        .find_edge_mut(edge_id)
        .ok_or_else(|| MutationError::not_found(EntityKind::Edge, edge_id))?
        .style = style.to_string();
    Ok(())
}

pub fn change_edge_label(
    project: &mut Project,
    edge_id: &str,
    label: &str,
) -> Result<(), MutationError> {
    project
        .find_edge_mut(edge_id)
        .ok_or_else(|| MutationError::not_found(EntityKind::Edge, edge_id))?
        .label = label.to_string();
    Ok(())
}
