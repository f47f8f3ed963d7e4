//! Tool execution: argument validation, canvas calls and the status text
//! returned to the client.
//!
//! Canvas-domain problems (bad input, missing element, backend errors) are
//! [`ToolOutcome::Failure`] values rendered as text. Only an unresolvable
//! tool name is a [`DispatchError`].

use excalidraw_core::{
    BrushStroke, ElementError, ElementKind, ElementSpec, ElementStyle, ElementSynthesizer,
    parse_points,
};
use excalidraw_core::element::{
    DEFAULT_BACKGROUND_COLOR, DEFAULT_OPACITY, DEFAULT_ROUGHNESS, DEFAULT_SIZE,
    DEFAULT_STROKE_COLOR, DEFAULT_STROKE_WIDTH,
};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::canvas::{ApiCallResult, CanvasClient, CanvasError, CanvasSnapshot};
use crate::tools::{CanvasTool, DEFAULT_EXPORT_HEIGHT, DEFAULT_EXPORT_WIDTH, EXPORT_FORMAT};
use crate::util::{preview, to_pretty_json};

const SUCCESS_MARKER: &str = "✅";
const FAILURE_MARKER: &str = "❌";
const DATA_URL_PREVIEW_CHARS: usize = 100;
const RAW_EXPORT_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("tools/call requires string field 'name'")]
    MissingToolName,
    #[error("tools/call 'params' must be an object")]
    InvalidParams,
    #[error("tools/call 'arguments' must be an object")]
    InvalidArguments,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    Failure(String),
}

impl ToolOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        ToolOutcome::Success(text.into())
    }

    pub fn failure(text: impl Into<String>) -> Self {
        ToolOutcome::Failure(text.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    pub fn render(&self) -> String {
        match self {
            ToolOutcome::Success(text) => format!("{SUCCESS_MARKER} {text}"),
            ToolOutcome::Failure(text) => format!("{FAILURE_MARKER} {text}"),
        }
    }
}

impl From<ElementError> for ToolOutcome {
    fn from(err: ElementError) -> Self {
        debug!(code = err.code(), "element synthesis rejected");
        ToolOutcome::Failure(err.to_string())
    }
}

type Outcome<T> = Result<T, ToolOutcome>;

pub struct ToolDispatcher {
    canvas: CanvasClient,
    synthesizer: ElementSynthesizer,
}

impl ToolDispatcher {
    pub fn new(canvas: CanvasClient, synthesizer: ElementSynthesizer) -> Self {
        Self {
            canvas,
            synthesizer,
        }
    }

    pub fn canvas(&self) -> &CanvasClient {
        &self.canvas
    }

    /// Run `name` and return the rendered status text.
    pub async fn call(
        &self,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<String, DispatchError> {
        let tool = CanvasTool::from_name(name)
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;
        let outcome = self.execute(tool, args).await;
        if !outcome.is_success() {
            warn!(tool = tool.name(), outcome = %outcome.render(), "tool reported failure");
        }
        Ok(outcome.render())
    }

    pub async fn execute(&self, tool: CanvasTool, args: &Map<String, Value>) -> ToolOutcome {
        let result = match tool {
            CanvasTool::HealthCheck => self.health_check().await,
            CanvasTool::GetCanvas => self.get_canvas().await,
            CanvasTool::UpdateCanvas => self.update_canvas(args).await,
            CanvasTool::ClearCanvas => self.clear_canvas().await,
            CanvasTool::ExportCanvas => self.export_canvas(args).await,
            CanvasTool::DrawWithBrush => self.draw_with_brush(args).await,
            CanvasTool::CreateElement => self.create_element(args).await,
            CanvasTool::GetElementById => self.get_element_by_id(args).await,
            CanvasTool::UpdateAppState => self.update_app_state(args).await,
            CanvasTool::RemoveElement => self.remove_element(args).await,
            CanvasTool::UpdateElement => self.update_element(args).await,
        };
        result.unwrap_or_else(|failure| failure)
    }

    async fn health_check(&self) -> Outcome<ToolOutcome> {
        let response = self
            .canvas
            .health()
            .await
            .map_err(|e| ToolOutcome::failure(format!("Connection failed: {e}")))?;
        if !response.is_ok() {
            return Err(ToolOutcome::failure(format!(
                "Server error: HTTP {}",
                response.status
            )));
        }
        Ok(ToolOutcome::success(format!(
            "Server is healthy: {}",
            response.text
        )))
    }

    async fn get_canvas(&self) -> Outcome<ToolOutcome> {
        const ACTION: &str = "get canvas data";
        let response = self.canvas.get_canvas().await.map_err(|e| failed(ACTION, e))?;
        if !response.is_ok() {
            return Err(failed_status(ACTION, &response));
        }
        let snapshot = CanvasSnapshot::from_body(&response.body).map_err(|e| failed(ACTION, e))?;
        let updated_at = match &snapshot.updated_at {
            Some(Value::String(at)) => at.clone(),
            Some(other) => other.to_string(),
            None => "unknown".to_string(),
        };
        Ok(ToolOutcome::success(format!(
            "Canvas data\nElements count: {}\nUpdated at: {updated_at}",
            snapshot.elements.len()
        )))
    }

    async fn update_canvas(&self, args: &Map<String, Value>) -> Outcome<ToolOutcome> {
        const ACTION: &str = "update canvas";
        let field = |key: &str| args.get(key).cloned().unwrap_or(Value::Null);
        let payload = json!({
            "elements": field("elements"),
            "appState": field("appState"),
            "files": field("files"),
        });
        self.expect_ok(ACTION, self.canvas.put_canvas(&payload).await)?;
        Ok(ToolOutcome::success("Canvas updated successfully"))
    }

    async fn clear_canvas(&self) -> Outcome<ToolOutcome> {
        self.expect_ok("clear canvas", self.canvas.clear_canvas().await)?;
        Ok(ToolOutcome::success("Canvas cleared successfully"))
    }

    async fn export_canvas(&self, args: &Map<String, Value>) -> Outcome<ToolOutcome> {
        let format = arg_string(args, "format", EXPORT_FORMAT)?;
        if format != EXPORT_FORMAT {
            return Err(ToolOutcome::failure(format!(
                "Unsupported format: {format}, only toDataURL format is supported"
            )));
        }
        let width = arg_dimension(args, "width", DEFAULT_EXPORT_WIDTH)?;
        let height = arg_dimension(args, "height", DEFAULT_EXPORT_HEIGHT)?;

        let response = self
            .canvas
            .export_canvas(width, height)
            .await
            .map_err(|e| ToolOutcome::failure(format!("Export request failed: {e}")))?;
        if !response.is_ok() {
            return Err(ToolOutcome::failure(format!(
                "Export failed: HTTP {}",
                response.status
            )));
        }
        if !response.is_json() {
            return Err(ToolOutcome::failure(format!(
                "Unexpected content type: {}",
                response.content_type
            )));
        }

        let raw = &response.text;
        let Ok(data) = serde_json::from_str::<Value>(raw) else {
            return Ok(ToolOutcome::success(format!(
                "toDataURL export successful\nContent length: {} characters\n\nPreview:\n{}",
                raw.chars().count(),
                preview(raw, RAW_EXPORT_PREVIEW_CHARS)
            )));
        };
        let data_url = data.get("dataURL").and_then(Value::as_str).unwrap_or_default();
        Ok(ToolOutcome::success(format!(
            "toDataURL export successful\nSize: {width}x{height}\nData URL length: {} characters\n\nData URL preview:\n{}\n\nFull response:\n{raw}",
            data_url.chars().count(),
            preview(data_url, DATA_URL_PREVIEW_CHARS)
        )))
    }

    async fn draw_with_brush(&self, args: &Map<String, Value>) -> Outcome<ToolOutcome> {
        const ACTION: &str = "create brush stroke";
        let raw_points = args.get("points").and_then(Value::as_array).map_or(0, Vec::len);
        if raw_points < 2 {
            return Err(ElementError::InsufficientBrushPoints.into());
        }
        let points = parse_points(args.get("points"))?;
        let stroke = BrushStroke {
            stroke_color: arg_string(args, "strokeColor", DEFAULT_STROKE_COLOR)?,
            stroke_width: arg_number(args, "strokeWidth", DEFAULT_STROKE_WIDTH)?,
            opacity: arg_number(args, "opacity", DEFAULT_OPACITY)?,
            roughness: arg_number(args, "roughness", DEFAULT_ROUGHNESS)?,
            points,
        };
        let element = self.synthesizer.brush_stroke(&stroke)?;
        let element_id = element.id().to_string();

        let mut snapshot = self.current_snapshot(ACTION).await?;
        snapshot.elements.push(element.into_value());
        self.expect_ok(ACTION, self.canvas.put_canvas(&snapshot.to_payload()).await)?;

        Ok(ToolOutcome::success(format!(
            "Brush stroke created successfully\nElement ID: {element_id}\nPoints: {} points\nColor: {}\nWidth: {}",
            stroke.points.len(),
            stroke.stroke_color,
            excalidraw_core::element::number(stroke.stroke_width)
        )))
    }

    async fn create_element(&self, args: &Map<String, Value>) -> Outcome<ToolOutcome> {
        let element_type = args
            .get("elementType")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty());
        let x = args.get("x").and_then(Value::as_f64);
        let y = args.get("y").and_then(Value::as_f64);
        let (Some(element_type), Some(x), Some(y)) = (element_type, x, y) else {
            return Err(ElementError::MissingRequired.into());
        };

        let kind = ElementKind::parse(element_type);
        let spec = ElementSpec {
            width: arg_number(args, "width", DEFAULT_SIZE)?,
            height: arg_number(args, "height", DEFAULT_SIZE)?,
            style: ElementStyle {
                stroke_color: arg_string(args, "strokeColor", DEFAULT_STROKE_COLOR)?,
                background_color: arg_string(args, "backgroundColor", DEFAULT_BACKGROUND_COLOR)?,
                stroke_width: arg_number(args, "strokeWidth", DEFAULT_STROKE_WIDTH)?,
                ..ElementStyle::default()
            },
            text: arg_string(args, "text", "")?,
            points: match kind {
                ElementKind::Line | ElementKind::Arrow | ElementKind::Freedraw => {
                    parse_points(args.get("points"))?
                }
                _ => Vec::new(),
            },
            ..ElementSpec::new(kind.clone(), x, y)
        };
        let element = self.synthesizer.element(&spec)?;

        let action = format!("create {} element", kind.as_str());
        let mut snapshot = self.current_snapshot(&action).await?;
        let summary = format!(
            "{} element created successfully\nElement ID: {}\nPosition: ({}, {})\nSize: {}x{}",
            kind.label(),
            element.id(),
            display(element.get("x")),
            display(element.get("y")),
            display(element.get("width")),
            display(element.get("height")),
        );
        snapshot.elements.push(element.into_value());
        self.expect_ok(&action, self.canvas.put_canvas(&snapshot.to_payload()).await)?;

        Ok(ToolOutcome::success(summary))
    }

    async fn get_element_by_id(&self, args: &Map<String, Value>) -> Outcome<ToolOutcome> {
        let element_id = required_element_id(args)?;
        let response = self
            .canvas
            .get_canvas()
            .await
            .map_err(|e| failed("get element", e))?;
        if !response.is_ok() {
            return Err(failed_status("get canvas data", &response));
        }
        let snapshot =
            CanvasSnapshot::from_body(&response.body).map_err(|e| failed("get element", e))?;

        let Some(element) = snapshot.find_element(element_id) else {
            return Err(not_found(element_id));
        };
        Ok(ToolOutcome::success(format!(
            "Element found\nID: {element_id}\nType: {}\nPosition: ({}, {})\nSize: {}x{}\n\nFull element data:\n{}",
            display(element.get("type")),
            display(element.get("x")),
            display(element.get("y")),
            display(element.get("width")),
            display(element.get("height")),
            to_pretty_json(element)
        )))
    }

    async fn update_app_state(&self, args: &Map<String, Value>) -> Outcome<ToolOutcome> {
        const ACTION: &str = "update app state";
        let Some(updates) = args
            .get("stateUpdates")
            .and_then(Value::as_object)
            .filter(|updates| !updates.is_empty())
        else {
            return Err(ToolOutcome::failure("Missing stateUpdates parameter"));
        };

        let mut snapshot = self.current_snapshot(ACTION).await?;
        for (key, value) in updates {
            snapshot.app_state.insert(key.clone(), value.clone());
        }
        self.expect_ok(ACTION, self.canvas.put_canvas(&snapshot.to_payload()).await)?;

        let fields: Vec<&str> = updates.keys().map(String::as_str).collect();
        Ok(ToolOutcome::success(format!(
            "App state updated successfully\nUpdated fields: {}",
            fields.join(", ")
        )))
    }

    async fn remove_element(&self, args: &Map<String, Value>) -> Outcome<ToolOutcome> {
        const ACTION: &str = "remove element";
        let element_id = required_element_id(args)?;
        let response = self
            .canvas
            .delete_element(element_id)
            .await
            .map_err(|e| failed(ACTION, e))?;
        let message = element_response(ACTION, element_id, &response)?;
        Ok(ToolOutcome::success(
            message.unwrap_or("Element removed successfully"),
        ))
    }

    async fn update_element(&self, args: &Map<String, Value>) -> Outcome<ToolOutcome> {
        const ACTION: &str = "update element";
        let element_id = required_element_id(args)?;
        let Some(element_data) = args
            .get("element_data")
            .filter(|data| data.as_object().is_some_and(|map| !map.is_empty()))
        else {
            return Err(ToolOutcome::failure("Missing element_data parameter"));
        };
        let response = self
            .canvas
            .update_element(element_id, element_data)
            .await
            .map_err(|e| failed(ACTION, e))?;
        let message = element_response(ACTION, element_id, &response)?;
        Ok(ToolOutcome::success(
            message.unwrap_or("Element updated successfully"),
        ))
    }

    /// Re-read the canvas right before a read-modify-write. A failed read
    /// aborts the mutation.
    async fn current_snapshot(&self, action: &str) -> Outcome<CanvasSnapshot> {
        let response = self.canvas.get_canvas().await.map_err(|e| failed(action, e))?;
        if !response.is_ok() {
            return Err(ToolOutcome::failure(format!(
                "Failed to get current canvas data: HTTP {}",
                response.status
            )));
        }
        CanvasSnapshot::from_body(&response.body).map_err(|e| failed(action, e))
    }

    fn expect_ok(
        &self,
        action: &str,
        result: Result<ApiCallResult, CanvasError>,
    ) -> Outcome<ApiCallResult> {
        let response = result.map_err(|e| failed(action, e))?;
        if !response.is_ok() {
            return Err(failed_status(action, &response));
        }
        Ok(response)
    }
}

fn failed(action: &str, err: impl std::fmt::Display) -> ToolOutcome {
    ToolOutcome::failure(format!("Failed to {action}: {err}"))
}

fn failed_status(action: &str, response: &ApiCallResult) -> ToolOutcome {
    ToolOutcome::failure(format!("Failed to {action}: HTTP {}", response.status))
}

fn not_found(element_id: &str) -> ToolOutcome {
    ToolOutcome::failure(format!("Element with ID '{element_id}' not found"))
}

/// Shared status mapping for the per-element endpoints.
fn element_response<'a>(
    action: &str,
    element_id: &str,
    response: &'a ApiCallResult,
) -> Outcome<Option<&'a str>> {
    if response.is_not_found() {
        return Err(not_found(element_id));
    }
    if !response.is_ok() {
        return Err(failed_status(action, response));
    }
    Ok(response.message())
}

/// Render a JSON scalar the way a person would write it: strings unquoted,
/// missing values as `None`.
fn display(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "None".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn required_element_id(args: &Map<String, Value>) -> Outcome<&str> {
    args.get("element_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ToolOutcome::failure("Missing element_id parameter"))
}

fn arg_string(args: &Map<String, Value>, key: &str, default: &str) -> Outcome<String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(v)) => Ok(v.clone()),
        Some(_) => Err(ToolOutcome::failure(format!("'{key}' must be a string"))),
    }
}

fn arg_number(args: &Map<String, Value>, key: &str, default: f64) -> Outcome<f64> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ToolOutcome::failure(format!("'{key}' must be a number"))),
        Some(_) => Err(ToolOutcome::failure(format!("'{key}' must be a number"))),
    }
}

fn arg_dimension(args: &Map<String, Value>, key: &str, default: u64) -> Outcome<u64> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .filter(|v| *v >= 1)
            .ok_or_else(|| ToolOutcome::failure(format!("'{key}' must be a positive integer"))),
    }
}
