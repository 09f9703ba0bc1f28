//! Local document normalizer
//!
//! Reads CWL documents from the filesystem or over http(s) and rewrites them
//! into the canonical shape the model deserializes:
//! - map-form `inputs`, `outputs`, `steps`, `in`, `requirements` and `hints`
//!   become lists
//! - parameter, step and step IO ids are shortened to their last segment
//! - `run` references become absolute URIs, embedded `run` documents are
//!   normalized recursively
//! - a scalar `scatter` becomes a list

use super::Normalizer;
use crate::error::{CwlError, CwlResult};
use crate::model::CWL_VERSION;
use crate::runtime::fs_utils;
use reqwest::blocking::Client;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use std::path::PathBuf;
use tracing::{debug, warn};
use url::Url;

/// Options of the [`LocalNormalizer`]
#[derive(Debug, Clone)]
pub struct NormalizerOptions {
    /// Fail on documents advertising another schema version instead of warning
    pub strict_version: bool,
    /// The accepted `cwlVersion`
    pub cwl_version: String,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            strict_version: false,
            cwl_version: CWL_VERSION.to_string(),
        }
    }
}

/// Normalizer for local files and http(s) documents
#[derive(Debug, Clone, Default)]
pub struct LocalNormalizer {
    options: NormalizerOptions,
}

impl LocalNormalizer {
    pub fn new(options: NormalizerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &NormalizerOptions {
        &self.options
    }

    /// Turn a path or URI into an absolute URI and fetch the document text.
    fn read(&self, uri: &str) -> CwlResult<(String, String)> {
        let without_fragment = uri.split('#').next().unwrap_or(uri);
        match Url::parse(without_fragment) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                debug!(url = %url, "fetching remote cwl document");
                let text = Client::new()
                    .get(url.clone())
                    .send()
                    .and_then(|response| response.error_for_status())
                    .and_then(|response| response.text())
                    .map_err(|e| CwlError::bad_document(uri, e))?;
                Ok((url.to_string(), text))
            }
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| CwlError::bad_document(uri, "not a local file uri"))?;
                self.read_path(uri, path)
            }
            Ok(url) if url.scheme().len() > 1 => Err(CwlError::bad_document(
                uri,
                format!("unsupported uri scheme {}", url.scheme()),
            )),
            // Relative paths and Windows drive letters
            _ => self.read_path(uri, PathBuf::from(without_fragment)),
        }
    }

    fn read_path(&self, uri: &str, path: PathBuf) -> CwlResult<(String, String)> {
        let path = fs_utils::file_exists(&path).map_err(|e| CwlError::bad_document(uri, e))?;
        let text =
            fs_utils::read_file_to_string(&path).map_err(|e| CwlError::bad_document(uri, e))?;
        let base = fs_utils::path_to_uri(&path).map_err(|e| CwlError::bad_document(uri, e))?;
        Ok((base, text))
    }

    fn check_version(&self, uri: &str, document: &JsonMap<String, JsonValue>) -> CwlResult<()> {
        let Some(version) = document.get("cwlVersion").and_then(JsonValue::as_str) else {
            return Ok(());
        };
        if version == self.options.cwl_version {
            return Ok(());
        }
        if self.options.strict_version {
            return Err(CwlError::UnsupportedVersion {
                found: version.to_string(),
                supported: self.options.cwl_version.clone(),
            });
        }
        warn!(
            uri = %uri,
            found = %version,
            supported = %self.options.cwl_version,
            "unsupported cwl version, loading anyway"
        );
        Ok(())
    }

    fn normalize_process(
        &self,
        document: JsonValue,
        id: Option<String>,
        base: Option<&str>,
    ) -> CwlResult<JsonValue> {
        let label = id.clone().or_else(|| base.map(str::to_string)).unwrap_or_default();
        let mut document = match document {
            JsonValue::Object(map) => map,
            other => {
                return Err(CwlError::bad_document(
                    label,
                    format!("expected a mapping, got {}", type_name(&other)),
                ))
            }
        };
        if document.contains_key("$graph") {
            return Err(CwlError::bad_document(
                label,
                "packed documents ($graph) are not supported",
            ));
        }
        self.check_version(&label, &document)?;

        let declared = document.get("id").and_then(JsonValue::as_str);
        let resolved_id = match (declared, id) {
            (Some(declared), _) if Url::parse(declared).is_ok() => Some(declared.to_string()),
            (_, Some(id)) => Some(id),
            (Some(declared), None) => Some(declared.to_string()),
            (None, None) => None,
        };
        if let Some(id) = &resolved_id {
            document.insert("id".to_string(), JsonValue::String(id.clone()));
        }

        for key in ["inputs", "outputs"] {
            if let Some(parameters) = document.remove(key) {
                document.insert(key.to_string(), normalize_parameters(&label, parameters)?);
            }
        }
        expand_stream_outputs(&mut document);
        for key in ["requirements", "hints"] {
            if let Some(requirements) = document.remove(key) {
                document.insert(key.to_string(), normalize_requirements(&label, requirements)?);
            }
        }
        if let Some(steps) = document.remove("steps") {
            let parent = resolved_id.as_deref().or(base);
            let steps = to_list(&label, "steps", steps, |id, value| match value {
                JsonValue::Object(mut step) => {
                    step.insert("id".to_string(), JsonValue::String(id));
                    Ok(JsonValue::Object(step))
                }
                other => Err(CwlError::bad_document(
                    id,
                    format!("step must be a mapping, got {}", type_name(&other)),
                )),
            })?
            .into_iter()
            .map(|step| self.normalize_step(&label, step, parent, base))
            .collect::<CwlResult<Vec<_>>>()?;
            document.insert("steps".to_string(), JsonValue::Array(steps));
        }
        Ok(JsonValue::Object(document))
    }

    fn normalize_step(
        &self,
        label: &str,
        step: JsonValue,
        parent: Option<&str>,
        base: Option<&str>,
    ) -> CwlResult<JsonValue> {
        let mut step = match step {
            JsonValue::Object(map) => map,
            other => return Err(CwlError::bad_document(label, format!("bad step {}", other))),
        };
        let step_id = step
            .get("id")
            .and_then(JsonValue::as_str)
            .map(shorten_id)
            .ok_or_else(|| CwlError::bad_document(label, "step without id"))?;
        step.insert("id".to_string(), JsonValue::String(step_id.clone()));

        if let Some(inputs) = step.remove("in") {
            let inputs = to_list(label, "in", inputs, |id, value| {
                let mut input = match value {
                    JsonValue::Object(input) => input,
                    source @ (JsonValue::String(_) | JsonValue::Array(_)) => {
                        let mut input = JsonMap::new();
                        input.insert("source".to_string(), source);
                        input
                    }
                    other => {
                        return Err(CwlError::bad_document(
                            &id,
                            format!("bad step input {}", other),
                        ))
                    }
                };
                input.insert("id".to_string(), JsonValue::String(id));
                if let Some(source) = input.remove("source") {
                    input.insert("source".to_string(), shorten_source(source));
                }
                Ok(JsonValue::Object(input))
            })?;
            step.insert("in".to_string(), JsonValue::Array(inputs));
        }

        if let Some(JsonValue::Array(outputs)) = step.remove("out") {
            let outputs = outputs
                .into_iter()
                .map(|output| match output {
                    JsonValue::String(id) => JsonValue::String(shorten_id(&id)),
                    JsonValue::Object(mut record) => {
                        if let Some(id) = record.get("id").and_then(JsonValue::as_str) {
                            let id = shorten_id(id);
                            record.insert("id".to_string(), JsonValue::String(id));
                        }
                        JsonValue::Object(record)
                    }
                    other => other,
                })
                .collect();
            step.insert("out".to_string(), JsonValue::Array(outputs));
        }

        if let Some(scatter) = step.remove("scatter") {
            let scatter = match scatter {
                JsonValue::String(id) => vec![JsonValue::String(shorten_id(&id))],
                JsonValue::Array(ids) => ids
                    .into_iter()
                    .map(|id| match id {
                        JsonValue::String(id) => JsonValue::String(shorten_id(&id)),
                        other => other,
                    })
                    .collect(),
                other => vec![other],
            };
            step.insert("scatter".to_string(), JsonValue::Array(scatter));
        }

        for key in ["requirements", "hints"] {
            if let Some(requirements) = step.remove(key) {
                step.insert(key.to_string(), normalize_requirements(label, requirements)?);
            }
        }

        match step.remove("run") {
            Some(JsonValue::String(run)) => {
                let run = resolve_reference(&run, base)?;
                step.insert("run".to_string(), JsonValue::String(run));
            }
            Some(embedded @ JsonValue::Object(_)) => {
                let embedded_id = format!(
                    "{}#{}",
                    parent.unwrap_or_default().split('#').next().unwrap_or_default(),
                    step_id
                );
                let embedded = self.normalize_process(embedded, Some(embedded_id), base)?;
                step.insert("run".to_string(), embedded);
            }
            Some(other) => {
                return Err(CwlError::bad_document(
                    label,
                    format!("step {} has an invalid run field {}", step_id, other),
                ))
            }
            None => {
                return Err(CwlError::bad_document(
                    label,
                    format!("step {} has no run field", step_id),
                ))
            }
        }
        Ok(JsonValue::Object(step))
    }
}

impl Normalizer for LocalNormalizer {
    fn normalize_uri(&self, uri: &str) -> CwlResult<JsonValue> {
        let (base, text) = self.read(uri)?;
        let document: JsonValue =
            serde_yaml::from_str(&text).map_err(|e| CwlError::bad_document(uri, e))?;
        self.normalize_process(document, Some(base.clone()), Some(&base))
    }

    fn normalize_document(&self, document: JsonValue, base: Option<&str>) -> CwlResult<JsonValue> {
        self.normalize_process(document, base.map(str::to_string), base)
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "mapping",
    }
}

/// Last segment of an id: `file:///wf.cwl#step/in` → `in`.
pub fn shorten_id(id: &str) -> String {
    let fragment = id.rsplit('#').next().unwrap_or(id);
    fragment.rsplit('/').next().unwrap_or(fragment).to_string()
}

/// Strip the document part of source references: `wf.cwl#step/out` → `step/out`.
fn shorten_source(source: JsonValue) -> JsonValue {
    let strip = |source: &str| match source.split_once('#') {
        Some((_, fragment)) => fragment.to_string(),
        None => source.to_string(),
    };
    match source {
        JsonValue::String(source) => JsonValue::String(strip(&source)),
        JsonValue::Array(sources) => JsonValue::Array(
            sources
                .into_iter()
                .map(|source| match source {
                    JsonValue::String(source) => JsonValue::String(strip(&source)),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

/// Resolve a `run` reference against the document URI.
fn resolve_reference(run: &str, base: Option<&str>) -> CwlResult<String> {
    if Url::parse(run).is_ok_and(|url| url.scheme().len() > 1) {
        return Ok(run.to_string());
    }
    match base.map(Url::parse) {
        Some(Ok(base_url)) => base_url
            .join(run)
            .map(|url| url.to_string())
            .map_err(|e| CwlError::bad_document(run, e)),
        _ => {
            let cwd = std::env::current_dir()
                .map_err(|e| CwlError::bad_document(run, e))?;
            Ok(fs_utils::path_to_uri(cwd.join(run))?)
        }
    }
}

/// Accept either a list of records or a map keyed by id.
///
/// `make` receives the shortened id and the entry (the map value in map form,
/// the whole record in list form) and returns the canonical record.
fn to_list<F>(label: &str, key: &str, value: JsonValue, make: F) -> CwlResult<Vec<JsonValue>>
where
    F: Fn(String, JsonValue) -> CwlResult<JsonValue>,
{
    match value {
        JsonValue::Array(entries) => entries
            .into_iter()
            .map(|entry| {
                let id = entry
                    .get("id")
                    .and_then(JsonValue::as_str)
                    .map(shorten_id)
                    .ok_or_else(|| {
                        CwlError::bad_document(label, format!("{} entry without id", key))
                    })?;
                make(id, entry)
            })
            .collect(),
        JsonValue::Object(entries) => entries
            .into_iter()
            .map(|(id, entry)| make(shorten_id(&id), entry))
            .collect(),
        JsonValue::Null => Ok(Vec::new()),
        other => Err(CwlError::bad_document(
            label,
            format!("{} must be a list or a mapping, got {}", key, type_name(&other)),
        )),
    }
}

fn normalize_parameters(label: &str, parameters: JsonValue) -> CwlResult<JsonValue> {
    let parameters = to_list(label, "parameters", parameters, |id, value| {
        let mut parameter = match value {
            JsonValue::Object(parameter) => parameter,
            // `id: type` shorthand
            declared => {
                let mut parameter = JsonMap::new();
                parameter.insert("type".to_string(), declared);
                parameter
            }
        };
        parameter.insert("id".to_string(), JsonValue::String(id));
        if let Some(source) = parameter.remove("outputSource") {
            parameter.insert("outputSource".to_string(), shorten_source(source));
        }
        Ok(JsonValue::Object(parameter))
    })?;
    Ok(JsonValue::Array(parameters))
}

/// Rewrite `type: stdout` and `type: stderr` outputs into globbed `File` outputs.
fn expand_stream_outputs(document: &mut JsonMap<String, JsonValue>) {
    let mut redirected: Vec<(String, Option<String>)> = ["stdout", "stderr"]
        .iter()
        .map(|stream| {
            let target = document
                .get(*stream)
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            (stream.to_string(), target)
        })
        .collect();
    let Some(JsonValue::Array(outputs)) = document.get_mut("outputs") else {
        return;
    };
    for output in outputs.iter_mut() {
        let JsonValue::Object(output) = output else {
            continue;
        };
        let Some(index) = output
            .get("type")
            .and_then(JsonValue::as_str)
            .and_then(|declared| redirected.iter().position(|(stream, _)| stream == declared))
        else {
            continue;
        };
        let (stream, target) = &mut redirected[index];
        let id = output
            .get("id")
            .and_then(JsonValue::as_str)
            .unwrap_or(stream.as_str())
            .to_string();
        let glob = target
            .get_or_insert_with(|| format!("{}.{}", id, stream))
            .clone();
        output.insert("type".to_string(), JsonValue::String("File".to_string()));
        output.insert("outputBinding".to_string(), json!({ "glob": glob }));
    }
    for (stream, target) in redirected {
        if let Some(target) = target {
            document.entry(stream).or_insert(JsonValue::String(target));
        }
    }
}

fn normalize_requirements(label: &str, requirements: JsonValue) -> CwlResult<JsonValue> {
    match requirements {
        JsonValue::Object(entries) => {
            let list = entries
                .into_iter()
                .map(|(class, body)| {
                    let mut body = match body {
                        JsonValue::Object(body) => body,
                        JsonValue::Null => JsonMap::new(),
                        other => {
                            return Err(CwlError::bad_document(
                                label,
                                format!("requirement {} must be a mapping, got {}", class, other),
                            ))
                        }
                    };
                    body.insert("class".to_string(), JsonValue::String(class));
                    Ok(JsonValue::Object(body))
                })
                .collect::<CwlResult<Vec<_>>>()?;
            Ok(JsonValue::Array(list))
        }
        list @ JsonValue::Array(_) => Ok(list),
        other => Err(CwlError::bad_document(
            label,
            format!("requirements must be a list or a mapping, got {}", type_name(&other)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const ECHO: &str = r#"
cwlVersion: v1.2
class: CommandLineTool
baseCommand: echo
inputs:
  message:
    type: string
    inputBinding:
      position: 1
  times: int?
outputs:
  out: stdout
stdout: out.txt
requirements:
  DockerRequirement:
    dockerPull: alpine
"#;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_normalize_map_forms() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(&temp_dir, "echo.cwl", ECHO);
        let document = LocalNormalizer::default()
            .normalize_uri(path.to_str().unwrap())
            .unwrap();

        assert!(document["id"].as_str().unwrap().starts_with("file:///"));
        assert!(document["id"].as_str().unwrap().ends_with("/echo.cwl"));
        assert_eq!(document["inputs"][0]["id"], json!("message"));
        assert_eq!(document["inputs"][1], json!({"id": "times", "type": "int?"}));
        assert_eq!(
            document["outputs"][0],
            json!({"id": "out", "type": "File", "outputBinding": {"glob": "out.txt"}})
        );
        assert_eq!(
            document["requirements"],
            json!([{"class": "DockerRequirement", "dockerPull": "alpine"}])
        );
    }

    #[test]
    fn test_run_references_become_absolute() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir, "echo.cwl", ECHO);
        let path = write(
            &temp_dir,
            "wf.cwl",
            r#"
cwlVersion: v1.2
class: Workflow
inputs:
  msg: string
outputs: []
steps:
  say:
    run: echo.cwl
    in:
      message: msg
    out: [out]
    scatter: message
"#,
        );
        let document = LocalNormalizer::default()
            .normalize_uri(path.to_str().unwrap())
            .unwrap();
        let step = &document["steps"][0];
        assert_eq!(step["id"], json!("say"));
        assert!(step["run"].as_str().unwrap().starts_with("file:///"));
        assert!(step["run"].as_str().unwrap().ends_with("/echo.cwl"));
        assert_eq!(step["in"], json!([{"id": "message", "source": "msg"}]));
        assert_eq!(step["scatter"], json!(["message"]));
    }

    #[test]
    fn test_embedded_run_gets_an_id() {
        let document = json!({
            "class": "Workflow",
            "id": "file:///wf/outer.cwl",
            "inputs": [],
            "outputs": [],
            "steps": [{
                "id": "inner",
                "in": {},
                "out": [],
                "run": {"class": "CommandLineTool", "inputs": {}, "outputs": {}},
            }],
        });
        let normalized = LocalNormalizer::default()
            .normalize_document(document, None)
            .unwrap();
        assert_eq!(
            normalized["steps"][0]["run"]["id"],
            json!("file:///wf/outer.cwl#inner")
        );
    }

    #[test]
    fn test_shorten_ids() {
        assert_eq!(shorten_id("file:///a/wf.cwl#step1/message"), "message");
        assert_eq!(shorten_id("#message"), "message");
        assert_eq!(shorten_id("message"), "message");
        assert_eq!(
            shorten_source(json!("file:///a/wf.cwl#step1/out")),
            json!("step1/out")
        );
        assert_eq!(shorten_source(json!(["#a/out", "b/out"])), json!(["a/out", "b/out"]));
    }

    #[test]
    fn test_version_mismatch() {
        let document = json!({
            "class": "CommandLineTool",
            "id": "file:///tools/old.cwl",
            "cwlVersion": "v1.0",
            "inputs": [],
            "outputs": [],
        });
        let lenient = LocalNormalizer::default().normalize_document(document.clone(), None);
        assert!(lenient.is_ok());

        let strict = LocalNormalizer::new(NormalizerOptions {
            strict_version: true,
            ..Default::default()
        })
        .normalize_document(document, None);
        assert!(matches!(strict, Err(CwlError::UnsupportedVersion { .. })));
    }

    #[test]
    fn test_bad_documents() {
        let normalizer = LocalNormalizer::default();
        assert!(matches!(
            normalizer.normalize_uri("/does/not/exist.cwl"),
            Err(CwlError::BadDocument { .. })
        ));
        assert!(matches!(
            normalizer.normalize_document(json!({"$graph": []}), None),
            Err(CwlError::BadDocument { .. })
        ));
        assert!(matches!(
            normalizer.normalize_document(json!(["not", "a", "process"]), None),
            Err(CwlError::BadDocument { .. })
        ));

        let temp_dir = TempDir::new().unwrap();
        let path = write(&temp_dir, "broken.cwl", "class: [unclosed");
        assert!(matches!(
            normalizer.normalize_uri(path.to_str().unwrap()),
            Err(CwlError::BadDocument { .. })
        ));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(&temp_dir, "echo.cwl", ECHO);
        let normalizer = LocalNormalizer::default();
        let once = normalizer.normalize_uri(path.to_str().unwrap()).unwrap();
        let twice = normalizer.normalize_document(once.clone(), None).unwrap();
        assert_eq!(once, twice);
    }
}
