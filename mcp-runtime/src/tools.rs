use std::sync::LazyLock;

use serde_json::{Value, json};

pub const DEFAULT_EXPORT_WIDTH: u64 = 800;
pub const DEFAULT_EXPORT_HEIGHT: u64 = 600;
pub const EXPORT_FORMAT: &str = "toDataURL";

/// The closed set of tools. Dispatch matches on this exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanvasTool {
    HealthCheck,
    GetCanvas,
    UpdateCanvas,
    ClearCanvas,
    ExportCanvas,
    DrawWithBrush,
    CreateElement,
    GetElementById,
    UpdateAppState,
    RemoveElement,
    UpdateElement,
}

impl CanvasTool {
    /// Registry order, as listed by `tools/list`.
    pub const ALL: [CanvasTool; 11] = [
        CanvasTool::HealthCheck,
        CanvasTool::GetCanvas,
        CanvasTool::UpdateCanvas,
        CanvasTool::ClearCanvas,
        CanvasTool::ExportCanvas,
        CanvasTool::DrawWithBrush,
        CanvasTool::CreateElement,
        CanvasTool::GetElementById,
        CanvasTool::UpdateAppState,
        CanvasTool::RemoveElement,
        CanvasTool::UpdateElement,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CanvasTool::HealthCheck => "health_check",
            CanvasTool::GetCanvas => "get_canvas",
            CanvasTool::UpdateCanvas => "update_canvas",
            CanvasTool::ClearCanvas => "clear_canvas",
            CanvasTool::ExportCanvas => "export_canvas",
            CanvasTool::DrawWithBrush => "draw_with_brush",
            CanvasTool::CreateElement => "create_element",
            CanvasTool::GetElementById => "get_element_by_id",
            CanvasTool::UpdateAppState => "update_app_state",
            CanvasTool::RemoveElement => "remove_element",
            CanvasTool::UpdateElement => "update_element",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            CanvasTool::HealthCheck => "Check server status (GET /health)",
            CanvasTool::GetCanvas => "Get current canvas data (GET /canvas)",
            CanvasTool::UpdateCanvas => "Update canvas data (PUT /canvas)",
            CanvasTool::ClearCanvas => "Clear canvas (POST /canvas/clear)",
            CanvasTool::ExportCanvas => "Export canvas as toDataURL format (GET /canvas/export)",
            CanvasTool::DrawWithBrush => "Draw with brush tool (create freedraw element)",
            CanvasTool::CreateElement => "Create a new canvas element (supports multiple types)",
            CanvasTool::GetElementById => "Get specific element by ID",
            CanvasTool::UpdateAppState => "Update application state (theme, zoom, etc.)",
            CanvasTool::RemoveElement => "Remove element by specified ID",
            CanvasTool::UpdateElement => "Update element by specified ID",
        }
    }

    pub fn input_schema(self) -> Value {
        match self {
            CanvasTool::HealthCheck | CanvasTool::GetCanvas | CanvasTool::ClearCanvas => {
                empty_schema()
            }
            CanvasTool::UpdateCanvas => json!({
                "type": "object",
                "properties": {
                    "elements": {
                        "type": "array",
                        "description": "Array of Excalidraw drawing elements",
                        "items": element_item_schema(),
                        "default": []
                    },
                    "appState": {
                        "type": "object",
                        "description": "Application state including viewport and UI settings",
                        "properties": {
                            "viewBackgroundColor": {"type": "string", "description": "Canvas background color"},
                            "gridSize": {"type": "number", "description": "Grid size"},
                            "scrollX": {"type": "number", "description": "Horizontal scroll position"},
                            "scrollY": {"type": "number", "description": "Vertical scroll position"},
                            "zoom": {"type": "object", "description": "Zoom configuration"}
                        },
                        "default": {}
                    },
                    "files": {
                        "type": "object",
                        "description": "File attachments (images, etc.) keyed by file ID",
                        "additionalProperties": {
                            "type": "object",
                            "properties": {
                                "mimeType": {"type": "string", "description": "MIME type of the file"},
                                "id": {"type": "string", "description": "File identifier"},
                                "dataURL": {"type": "string", "description": "Base64 encoded file data"}
                            }
                        },
                        "default": {}
                    }
                },
                "required": []
            }),
            CanvasTool::ExportCanvas => json!({
                "type": "object",
                "properties": {
                    "format": {
                        "type": "string",
                        "description": "Export format: toDataURL",
                        "enum": [EXPORT_FORMAT],
                        "default": EXPORT_FORMAT
                    },
                    "width": {
                        "type": "integer",
                        "description": "Export width in pixels",
                        "minimum": 1,
                        "maximum": 4096,
                        "default": DEFAULT_EXPORT_WIDTH
                    },
                    "height": {
                        "type": "integer",
                        "description": "Export height in pixels",
                        "minimum": 1,
                        "maximum": 4096,
                        "default": DEFAULT_EXPORT_HEIGHT
                    }
                },
                "required": []
            }),
            CanvasTool::DrawWithBrush => json!({
                "type": "object",
                "properties": {
                    "points": {
                        "type": "array",
                        "description": "Array of path points for the brush stroke",
                        "items": point_schema("Point coordinates [x, y] or [x, y, pressure]"),
                        "minItems": 2
                    },
                    "strokeColor": {
                        "type": "string",
                        "description": "Stroke color (hex format)",
                        "default": "#1e1e1e"
                    },
                    "strokeWidth": {
                        "type": "number",
                        "description": "Stroke width",
                        "minimum": 1,
                        "maximum": 50,
                        "default": 2
                    },
                    "opacity": {
                        "type": "number",
                        "description": "Opacity percentage",
                        "minimum": 0,
                        "maximum": 100,
                        "default": 100
                    },
                    "roughness": {
                        "type": "number",
                        "description": "Roughness level",
                        "minimum": 0,
                        "maximum": 2,
                        "default": 1
                    }
                },
                "required": ["points"]
            }),
            CanvasTool::CreateElement => json!({
                "type": "object",
                "properties": {
                    "elementType": {
                        "type": "string",
                        "enum": ["rectangle", "ellipse", "diamond", "arrow", "line", "text", "freedraw"],
                        "description": "Type of element to create"
                    },
                    "x": {"type": "number", "description": "X coordinate"},
                    "y": {"type": "number", "description": "Y coordinate"},
                    "width": {"type": "number", "description": "Element width", "minimum": 1, "default": 100},
                    "height": {"type": "number", "description": "Element height", "minimum": 1, "default": 100},
                    "strokeColor": {
                        "type": "string",
                        "description": "Stroke color (hex format)",
                        "default": "#1e1e1e"
                    },
                    "backgroundColor": {
                        "type": "string",
                        "description": "Background color (hex format)",
                        "default": "transparent"
                    },
                    "strokeWidth": {
                        "type": "number",
                        "description": "Stroke width",
                        "minimum": 1,
                        "maximum": 50,
                        "default": 2
                    },
                    "text": {"type": "string", "description": "Text content (for text elements)"},
                    "points": {
                        "type": "array",
                        "description": "Points array (for line/arrow/freedraw elements)",
                        "items": point_schema("Point coordinates [x, y] or [x, y, pressure]")
                    }
                },
                "required": ["elementType", "x", "y"]
            }),
            CanvasTool::GetElementById => json!({
                "type": "object",
                "properties": {
                    "element_id": {
                        "type": "string",
                        "description": "Element ID to retrieve",
                        "minLength": 1
                    }
                },
                "required": ["element_id"]
            }),
            CanvasTool::UpdateAppState => json!({
                "type": "object",
                "properties": {
                    "stateUpdates": {
                        "type": "object",
                        "description": "State fields to update",
                        "properties": {
                            "theme": {"type": "string", "enum": ["light", "dark"]},
                            "zoom": {
                                "type": "object",
                                "properties": {
                                    "value": {"type": "number", "minimum": 0.1, "maximum": 10}
                                }
                            },
                            "scrollX": {"type": "number"},
                            "scrollY": {"type": "number"},
                            "viewBackgroundColor": {"type": "string"},
                            "gridModeEnabled": {"type": "boolean"},
                            "zenModeEnabled": {"type": "boolean"}
                        }
                    }
                },
                "required": ["stateUpdates"]
            }),
            CanvasTool::RemoveElement => json!({
                "type": "object",
                "properties": {
                    "element_id": element_id_schema("Unique identifier of the element to remove")
                },
                "required": ["element_id"]
            }),
            CanvasTool::UpdateElement => json!({
                "type": "object",
                "properties": {
                    "element_id": element_id_schema("Unique identifier of the element to update"),
                    "element_data": {
                        "type": "object",
                        "description": "Updated element properties",
                        "properties": element_properties_schema(),
                        "additionalProperties": true
                    }
                },
                "required": ["element_id", "element_data"]
            }),
        }
    }
}

fn empty_schema() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

fn point_schema(description: &str) -> Value {
    json!({
        "type": "array",
        "description": description,
        "minItems": 2,
        "maxItems": 3,
        "items": {"type": "number"}
    })
}

fn element_id_schema(description: &str) -> Value {
    json!({
        "type": "string",
        "description": description,
        "pattern": "^[a-zA-Z0-9_-]+$",
        "minLength": 1,
        "maxLength": 100
    })
}

fn element_properties_schema() -> Value {
    json!({
        "type": {"type": "string", "description": "Element type (rectangle, ellipse, arrow, line, text, etc.)"},
        "x": {"type": "number", "description": "X coordinate"},
        "y": {"type": "number", "description": "Y coordinate"},
        "width": {"type": "number", "description": "Element width"},
        "height": {"type": "number", "description": "Element height"},
        "strokeColor": {"type": "string", "description": "Stroke color"},
        "backgroundColor": {"type": "string", "description": "Background color"},
        "strokeWidth": {"type": "number", "description": "Stroke width", "minimum": 0},
        "roughness": {"type": "number", "description": "Roughness level (0-2)", "minimum": 0, "maximum": 2},
        "opacity": {"type": "number", "description": "Opacity (0-100)", "minimum": 0, "maximum": 100}
    })
}

fn element_item_schema() -> Value {
    let mut properties = element_properties_schema();
    properties["id"] = json!({"type": "string", "description": "Unique element identifier"});
    json!({
        "type": "object",
        "properties": properties,
        "required": ["id", "type", "x", "y"]
    })
}

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    CanvasTool::ALL
        .into_iter()
        .map(|tool| ToolDefinition {
            name: tool.name(),
            description: tool.description(),
            input_schema: tool.input_schema(),
        })
        .collect()
}

static TOOLS_LIST: LazyLock<Value> = LazyLock::new(|| {
    let tools: Vec<Value> = tool_definitions()
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect();
    json!({ "tools": tools })
});

/// `tools/list` result. Built once; every call returns the same value.
pub fn tools_list_payload() -> &'static Value {
    &TOOLS_LIST
}
