//! Event catalog for the sync protocol.
//!
//! Wire format: one JSON object per WebSocket text frame.
//! ```text
//! { "event": "cellMoved", "data": { "workspaceId": "w1", "projectId": "p1", ... } }
//! ```
//!
//! Inbound frames decode into [`ClientEvent`], outbound ones are built as
//! [`ServerEvent`]. Both are closed sets with one fixed-schema payload per
//! event name, so nothing duck-typed reaches the engine. Edit payloads are
//! wrapped in [`Relayed`], which keeps the JSON they arrived as: the relay
//! goes out under the same name with exactly that JSON.

use std::fmt;
use std::ops::Deref;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use varia_core::document::null_as_default;
use varia_core::{
    Cell, Connection, Extra, GeometryPatch, ModelHeader, Mutation, ProductLineHeader, Project,
};

/// Logical identity of a client: an issued guest number or a registered email.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientId {
    Guest(u64),
    User(String),
}

impl ClientId {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::User(email) if email.is_empty())
    }

    /// Stable key for storage; guest `7` and user `"7"` never collide.
    pub fn storage_key(&self) -> String {
        match self {
            Self::Guest(id) => format!("g:{id}"),
            Self::User(email) => format!("u:{email}"),
        }
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guest(id) => write!(f, "guest-{id}"),
            Self::User(email) => write!(f, "{email}"),
        }
    }
}

impl From<u64> for ClientId {
    fn from(id: u64) -> Self {
        Self::Guest(id)
    }
}

impl From<&str> for ClientId {
    fn from(email: &str) -> Self {
        Self::User(email.to_string())
    }
}

// ─── Identity & workspace payloads ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterUser {
    pub email: String,
    /// Remaining profile fields (name, avatar, ...), not interpreted here.
    #[serde(flatten)]
    pub profile: Extra,
}

/// `registerWorkspace`, `joinWorkspace` and the `workspaceJoined` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMember {
    pub client_id: ClientId,
    pub workspace_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenProject {
    pub workspace_id: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub inviter_name: String,
    pub invited_user_email: String,
    pub workspace_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestIdAssigned {
    pub guest_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRegistered {
    pub success: bool,
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceProject {
    pub client_id: ClientId,
    pub workspace_id: String,
    pub project: Project,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectOpened {
    pub project: Project,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

// ─── Relayed payloads ────────────────────────────────────────────────

/// A typed payload together with the JSON it was decoded from.
///
/// Serializes as that JSON, so fields the server does not model (and
/// number formatting) reach the other sessions unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Relayed<T> {
    payload: T,
    raw: Value,
}

impl<T: Serialize> Relayed<T> {
    /// Wrap a payload built in process; its serialized form is relayed.
    pub fn new(payload: T) -> Result<Self, ProtocolError> {
        let raw = serde_json::to_value(&payload)
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))?;
        Ok(Self { payload, raw })
    }
}

impl<T> Relayed<T> {
    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

impl<T> Deref for Relayed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.payload
    }
}

impl<T> Serialize for Relayed<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Relayed<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let payload = T::deserialize(&raw).map_err(de::Error::custom)?;
        Ok(Self { payload, raw })
    }
}

// ─── Document payloads ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCreated {
    pub workspace_id: String,
    pub client_id: ClientId,
    pub project: Project,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductLineCreated {
    pub workspace_id: String,
    pub project_id: String,
    pub product_line: ProductLineHeader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCreated {
    pub workspace_id: String,
    pub project_id: String,
    pub product_line_id: String,
    pub model: ModelHeader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDeleted {
    pub workspace_id: String,
    pub project_id: String,
    pub product_line_id: String,
    pub model_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRenamed {
    pub workspace_id: String,
    pub project_id: String,
    pub product_line_id: String,
    pub model_id: String,
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfigured {
    pub workspace_id: String,
    pub project_id: String,
    pub product_line_id: String,
    pub model_id: String,
    pub configuration: Value,
}

/// `cellMoved` and `cellResized`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellGeometryChanged {
    pub workspace_id: String,
    pub project_id: String,
    pub cell_id: String,
    pub cell: GeometryPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellAdded {
    pub workspace_id: String,
    pub project_id: String,
    pub model_id: String,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellRemoved {
    pub workspace_id: String,
    pub project_id: String,
    pub cell_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellConnected {
    pub workspace_id: String,
    pub project_id: String,
    pub model_id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertiesChanged {
    pub workspace_id: String,
    pub project_id: String,
    pub cell_id: String,
    pub properties: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStyleChanged {
    pub workspace_id: String,
    pub project_id: String,
    pub edge_id: String,
    pub new_style: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeLabelChanged {
    pub workspace_id: String,
    pub project_id: String,
    pub edge_id: String,
    pub label: String,
}

/// Ephemeral pointer position; everything but the room is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMoved {
    pub workspace_id: String,
    #[serde(flatten)]
    pub rest: Extra,
}

// ─── Events ──────────────────────────────────────────────────────────

/// Everything a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    SignUpAsGuest,
    RegisterUser(RegisterUser),
    RegisterWorkspace(WorkspaceMember),
    JoinWorkspace(WorkspaceMember),
    OpenProject(OpenProject),
    SendInvitation(Invitation),
    ProjectCreated(Relayed<ProjectCreated>),
    ProductLineCreated(Relayed<ProductLineCreated>),
    ModelCreated(Relayed<ModelCreated>),
    ModelDeleted(Relayed<ModelDeleted>),
    ModelRenamed(Relayed<ModelRenamed>),
    ModelConfigured(Relayed<ModelConfigured>),
    CellMoved(Relayed<CellGeometryChanged>),
    CellResized(Relayed<CellGeometryChanged>),
    CellAdded(Relayed<CellAdded>),
    CellRemoved(Relayed<CellRemoved>),
    CellConnected(Relayed<CellConnected>),
    PropertiesChanged(Relayed<PropertiesChanged>),
    EdgeStyleChanged(Relayed<EdgeStyleChanged>),
    EdgeLabelChanged(Relayed<EdgeLabelChanged>),
    CursorMoved(CursorMoved),
}

impl ClientEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SignUpAsGuest => "signUpAsGuest",
            Self::RegisterUser(_) => "registerUser",
            Self::RegisterWorkspace(_) => "registerWorkspace",
            Self::JoinWorkspace(_) => "joinWorkspace",
            Self::OpenProject(_) => "openProject",
            Self::SendInvitation(_) => "sendInvitation",
            Self::ProjectCreated(_) => "projectCreated",
            Self::ProductLineCreated(_) => "productLineCreated",
            Self::ModelCreated(_) => "modelCreated",
            Self::ModelDeleted(_) => "modelDeleted",
            Self::ModelRenamed(_) => "modelRenamed",
            Self::ModelConfigured(_) => "modelConfigured",
            Self::CellMoved(_) => "cellMoved",
            Self::CellResized(_) => "cellResized",
            Self::CellAdded(_) => "cellAdded",
            Self::CellRemoved(_) => "cellRemoved",
            Self::CellConnected(_) => "cellConnected",
            Self::PropertiesChanged(_) => "propertiesChanged",
            Self::EdgeStyleChanged(_) => "edgeStyleChanged",
            Self::EdgeLabelChanged(_) => "edgeLabelChanged",
            Self::CursorMoved(_) => "cursorMoved",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }

    pub fn decode_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }
}

/// Everything the server may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    GuestIdAssigned(GuestIdAssigned),
    WorkspaceRegistered(WorkspaceRegistered),
    ReplaceProject(ReplaceProject),
    WorkspaceJoined(WorkspaceMember),
    ProjectOpened(ProjectOpened),
    InvitationReceived(Invitation),
    Error(ErrorMessage),
    ProjectCreated(Relayed<ProjectCreated>),
    ProductLineCreated(Relayed<ProductLineCreated>),
    ModelCreated(Relayed<ModelCreated>),
    ModelDeleted(Relayed<ModelDeleted>),
    ModelRenamed(Relayed<ModelRenamed>),
    ModelConfigured(Relayed<ModelConfigured>),
    CellMoved(Relayed<CellGeometryChanged>),
    CellResized(Relayed<CellGeometryChanged>),
    CellAdded(Relayed<CellAdded>),
    CellRemoved(Relayed<CellRemoved>),
    CellConnected(Relayed<CellConnected>),
    PropertiesChanged(Relayed<PropertiesChanged>),
    EdgeStyleChanged(Relayed<EdgeStyleChanged>),
    EdgeLabelChanged(Relayed<EdgeLabelChanged>),
    CursorMoved(CursorMoved),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorMessage {
            message: message.into(),
        })
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }
}

// ─── Edit events ─────────────────────────────────────────────────────

/// An inbound event that edits a persisted project.
///
/// All of them are handled the same way: load the project, apply
/// [`DocumentEdit::mutation`], persist, relay the payload to the room.
pub trait DocumentEdit: Send + Sync + 'static {
    fn workspace_id(&self) -> &str;
    fn project_id(&self) -> &str;
    fn mutation(&self) -> Mutation;
    /// The relay of this payload, same event name.
    fn into_relay(self) -> ServerEvent;
}

macro_rules! document_edit {
    ($payload:ty, $variant:ident, |$e:ident| $mutation:expr) => {
        impl DocumentEdit for Relayed<$payload> {
            fn workspace_id(&self) -> &str {
                &self.workspace_id
            }

            fn project_id(&self) -> &str {
                &self.project_id
            }

            fn mutation(&self) -> Mutation {
                let $e: &$payload = self.payload();
                $mutation
            }

            fn into_relay(self) -> ServerEvent {
                ServerEvent::$variant(self)
            }
        }
    };
}

document_edit!(ProductLineCreated, ProductLineCreated, |e| {
    Mutation::CreateProductLine(e.product_line.clone())
});

document_edit!(ModelCreated, ModelCreated, |e| Mutation::CreateModel {
    product_line_id: e.product_line_id.clone(),
    model: e.model.clone(),
});

document_edit!(ModelDeleted, ModelDeleted, |e| Mutation::DeleteModel {
    product_line_id: e.product_line_id.clone(),
    model_id: e.model_id.clone(),
});

document_edit!(ModelRenamed, ModelRenamed, |e| Mutation::RenameModel {
    product_line_id: e.product_line_id.clone(),
    model_id: e.model_id.clone(),
    name: e.new_name.clone(),
});

document_edit!(ModelConfigured, ModelConfigured, |e| Mutation::ConfigureModel {
    product_line_id: e.product_line_id.clone(),
    model_id: e.model_id.clone(),
    configuration: e.configuration.clone(),
});

document_edit!(CellAdded, CellAdded, |e| Mutation::AddCells {
    model_id: e.model_id.clone(),
    cells: e.cells.clone(),
});

document_edit!(CellRemoved, CellRemoved, |e| Mutation::RemoveCells {
    cell_ids: e.cell_ids.clone(),
});

document_edit!(CellConnected, CellConnected, |e| Mutation::ConnectCells {
    model_id: e.model_id.clone(),
    connection: e.connection(),
});

document_edit!(PropertiesChanged, PropertiesChanged, |e| {
    Mutation::ChangeCellProperties {
        cell_id: e.cell_id.clone(),
        properties: e.properties.clone(),
    }
});

document_edit!(EdgeStyleChanged, EdgeStyleChanged, |e| Mutation::ChangeEdgeStyle {
    edge_id: e.edge_id.clone(),
    style: e.new_style.clone(),
});

document_edit!(EdgeLabelChanged, EdgeLabelChanged, |e| Mutation::ChangeEdgeLabel {
    edge_id: e.edge_id.clone(),
    label: e.label.clone(),
});

impl CellConnected {
    /// The edge record this event stores.
    pub fn connection(&self) -> Connection {
        Connection {
            id: self
                .edge_id
                .clone()
                .unwrap_or_else(|| Connection::default_id(&self.source_id, &self.target_id)),
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            properties: self.properties.clone(),
            style: self.style.clone().unwrap_or_default(),
            label: self.label.clone().unwrap_or_default(),
        }
    }
}

/// `cellMoved` / `cellResized` share a payload, so the edit carries its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryEdit {
    Move(Relayed<CellGeometryChanged>),
    Resize(Relayed<CellGeometryChanged>),
}

impl GeometryEdit {
    fn payload(&self) -> &CellGeometryChanged {
        match self {
            Self::Move(p) | Self::Resize(p) => p.payload(),
        }
    }
}

impl DocumentEdit for GeometryEdit {
    fn workspace_id(&self) -> &str {
        &self.payload().workspace_id
    }

    fn project_id(&self) -> &str {
        &self.payload().project_id
    }

    fn mutation(&self) -> Mutation {
        match self {
            Self::Move(p) => Mutation::MoveCell {
                cell_id: p.cell_id.clone(),
                position: p.cell,
            },
            Self::Resize(p) => Mutation::ResizeCell {
                cell_id: p.cell_id.clone(),
                size: p.cell,
            },
        }
    }

    fn into_relay(self) -> ServerEvent {
        match self {
            Self::Move(p) => ServerEvent::CellMoved(p),
            Self::Resize(p) => ServerEvent::CellResized(p),
        }
    }
}

/// Protocol errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}
