//! Static validation for pipeline skills.
//!
//! At registry load time every pipeline is proven against the registries it
//! will execute over: each step target must resolve unambiguously, every
//! required input of the target must be wired from a compatible source, and
//! every required pipeline output must be produced by some step. The union
//! of resolved target capabilities (the closure) is returned alongside the
//! error list so the loader can fill or cross-check the pipeline's declared
//! capabilities.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde_json::{Map, Value};

use conductor_protocol::{
    CallTargetKind, CapabilityId, OpDefinition, PipelineSkillDefinition, PipelineStep,
    SkillDefinition,
};
use conductor_schema::check_compatibility;

/// Lookup context over the loaded skill and op definitions.
pub struct PipelineLookup<'a> {
    skills: BTreeMap<(&'a str, &'a str), &'a SkillDefinition>,
    ops: BTreeMap<(&'a str, &'a str), &'a OpDefinition>,
}

/// A resolved step target's validation-relevant surface.
struct ResolvedTarget<'a> {
    capabilities: &'a [CapabilityId],
    inputs_schema: &'a Value,
    outputs_schema: &'a Value,
}

impl<'a> PipelineLookup<'a> {
    pub fn new(skills: &'a [SkillDefinition], ops: &'a [OpDefinition]) -> Self {
        Self {
            skills: skills
                .iter()
                .map(|skill| ((skill.name(), skill.version()), skill))
                .collect(),
            ops: ops.iter().map(|op| ((op.name.as_str(), op.version.as_str()), op)).collect(),
        }
    }

    fn resolve(&self, step: &PipelineStep) -> Option<ResolvedTarget<'a>> {
        let name = step.target.name.as_str();
        let version = step.target.version.as_deref();
        match step.target.kind {
            CallTargetKind::Skill => {
                let skill = resolve_one(&self.skills, name, version)?;
                Some(ResolvedTarget {
                    capabilities: skill.capabilities(),
                    inputs_schema: skill.inputs_schema(),
                    outputs_schema: skill.outputs_schema(),
                })
            }
            CallTargetKind::Op => {
                let op = resolve_one(&self.ops, name, version)?;
                Some(ResolvedTarget {
                    capabilities: &op.capabilities,
                    inputs_schema: &op.inputs_schema,
                    outputs_schema: &op.outputs_schema,
                })
            }
        }
    }
}

/// Resolve by name and optional version. Without a version, exactly one
/// registered version must exist; ambiguity resolves to `None`.
fn resolve_one<'a, T: ?Sized>(
    index: &BTreeMap<(&'a str, &'a str), &'a T>,
    name: &str,
    version: Option<&str>,
) -> Option<&'a T> {
    match version {
        Some(version) => index.get(&(name, version)).copied(),
        None => {
            let mut matches = index
                .iter()
                .filter(|((key_name, _), _)| *key_name == name)
                .map(|(_, value)| *value);
            let first = matches.next()?;
            if matches.next().is_some() {
                return None;
            }
            Some(first)
        }
    }
}

/// Validate pipeline wiring and return errors plus the capability closure.
pub fn validate_pipeline(
    skill: &PipelineSkillDefinition,
    lookup: &PipelineLookup<'_>,
) -> (Vec<String>, BTreeSet<CapabilityId>) {
    let mut errors = Vec::new();
    let mut closure: BTreeSet<CapabilityId> = BTreeSet::new();

    let pipeline_inputs = properties_map(&skill.inputs_schema);
    let pipeline_output_required = required_set(&skill.outputs_schema);
    let pipeline_output_properties = properties_map(&skill.outputs_schema);
    let mut mapped_pipeline_outputs: BTreeSet<String> = BTreeSet::new();

    // Output schemas published by earlier steps, keyed by step id.
    let mut step_outputs: BTreeMap<&str, Map<String, Value>> = BTreeMap::new();

    for step in &skill.steps {
        let target = match lookup.resolve(step) {
            Some(target) => target,
            None => {
                errors.push(format!(
                    "pipeline step {} references unknown {} {}",
                    step.id,
                    step.target.kind,
                    step.target.name
                ));
                continue;
            }
        };

        closure.extend(target.capabilities.iter().cloned());

        let target_input_props = properties_map(target.inputs_schema);
        let target_output_props = properties_map(target.outputs_schema);
        let required_inputs = required_set(target.inputs_schema);

        let missing_required: Vec<&String> = required_inputs
            .iter()
            .filter(|input| !step.inputs.contains_key(*input))
            .collect();
        if !missing_required.is_empty() {
            errors.push(format!(
                "pipeline step {} missing required inputs: {missing_required:?}",
                step.id
            ));
        }

        for (input_name, source) in &step.inputs {
            let target_schema = match target_input_props.get(input_name) {
                Some(schema) => schema,
                None => {
                    errors.push(format!(
                        "pipeline step {} maps unknown input {input_name}",
                        step.id
                    ));
                    continue;
                }
            };
            let source_schema =
                resolve_source_schema(step, source, &pipeline_inputs, &step_outputs, &mut errors);
            if let Some(source_schema) = source_schema {
                errors.extend(check_compatibility(
                    &source_schema,
                    target_schema,
                    &format!("pipeline step {} input {input_name}", step.id),
                ));
            }
        }

        let mut output_fields = Map::new();
        for (output_name, destination) in &step.outputs {
            let output_schema = match target_output_props.get(output_name) {
                Some(schema) => schema,
                None => {
                    errors.push(format!(
                        "pipeline step {} maps unknown output {output_name}",
                        step.id
                    ));
                    continue;
                }
            };
            output_fields.insert(output_name.clone(), output_schema.clone());
            if let Some(output_field) = destination.strip_prefix("$outputs.") {
                mapped_pipeline_outputs.insert(output_field.to_string());
                match pipeline_output_properties.get(output_field) {
                    None => errors.push(format!(
                        "pipeline step {} maps to unknown pipeline output {output_field}",
                        step.id
                    )),
                    Some(pipeline_schema) => errors.extend(check_compatibility(
                        output_schema,
                        pipeline_schema,
                        &format!("pipeline output {output_field}"),
                    )),
                }
            }
        }
        step_outputs.insert(&step.id, output_fields);
    }

    let missing_outputs: Vec<&String> = pipeline_output_required
        .iter()
        .filter(|field| !mapped_pipeline_outputs.contains(*field))
        .collect();
    if !missing_outputs.is_empty() {
        errors.push(format!(
            "pipeline outputs missing required fields: {missing_outputs:?}"
        ));
    }

    (errors, closure)
}

/// Resolve the schema a step input source refers to: a pipeline input
/// (`$inputs.<field>`) or an earlier step's declared output
/// (`$step.<id>.<field>`).
fn resolve_source_schema(
    step: &PipelineStep,
    source: &str,
    pipeline_inputs: &Map<String, Value>,
    step_outputs: &BTreeMap<&str, Map<String, Value>>,
    errors: &mut Vec<String>,
) -> Option<Value> {
    if let Some(field) = source.strip_prefix("$inputs.") {
        let schema = pipeline_inputs.get(field).cloned();
        if schema.is_none() {
            errors.push(format!(
                "pipeline step {} references unknown pipeline input {field}",
                step.id
            ));
        }
        return schema;
    }

    if let Some(tail) = source.strip_prefix("$step.") {
        let (step_id, field) = match tail.split_once('.') {
            Some(parts) => parts,
            None => {
                errors.push(format!("pipeline step {} has invalid source {source}", step.id));
                return None;
            }
        };
        let outputs = match step_outputs.get(step_id) {
            Some(outputs) => outputs,
            None => {
                errors.push(format!(
                    "pipeline step {} references unknown step output {step_id}",
                    step.id
                ));
                return None;
            }
        };
        let schema = outputs.get(field).cloned();
        if schema.is_none() {
            errors.push(format!(
                "pipeline step {} references unknown output field {field} from {step_id}",
                step.id
            ));
        }
        return schema;
    }

    errors.push(format!("pipeline step {} has invalid source {source}", step.id));
    None
}

fn properties_map(schema: &Value) -> Map<String, Value> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .filter(|(_, v)| v.is_object())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

fn required_set(schema: &Value) -> BTreeSet<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(name: &str, capability: &str, inputs: Value, outputs: Value) -> OpDefinition {
        serde_json::from_value(json!({
            "name": name,
            "version": "1.0.0",
            "description": "test op",
            "inputs_schema": inputs,
            "outputs_schema": outputs,
            "capabilities": [capability],
            "autonomy": "L2",
            "runtime": "native",
            "module": "ops",
            "handler": name,
            "failure_modes": [{"code": "failed", "description": "failed"}]
        }))
        .unwrap()
    }

    fn pipeline(steps: Value, inputs: Value, outputs: Value) -> PipelineSkillDefinition {
        serde_json::from_value(json!({
            "kind": "pipeline",
            "name": "digest",
            "version": "1.0.0",
            "description": "pipeline",
            "inputs_schema": inputs,
            "outputs_schema": outputs,
            "autonomy": "L3",
            "steps": steps,
            "failure_modes": [{"code": "failed", "description": "failed"}]
        }))
        .unwrap()
    }

    fn two_step_fixture() -> (Vec<OpDefinition>, PipelineSkillDefinition) {
        let fetch = op(
            "fetch_messages",
            "mail.read",
            json!({"type": "object", "required": ["folder"], "properties": {"folder": {"type": "string"}}}),
            json!({"type": "object", "properties": {"messages": {"type": "array", "items": {"type": "string"}}}}),
        );
        let summarize = op(
            "summarize",
            "llm.generate",
            json!({"type": "object", "required": ["texts"], "properties": {"texts": {"type": "array", "items": {"type": "string"}}}}),
            json!({"type": "object", "properties": {"summary": {"type": "string"}}}),
        );
        let pipe = pipeline(
            json!([
                {
                    "id": "fetch",
                    "target": {"kind": "op", "name": "fetch_messages"},
                    "inputs": {"folder": "$inputs.folder"},
                    "outputs": {"messages": "$step.fetch.messages"}
                },
                {
                    "id": "digest",
                    "target": {"kind": "op", "name": "summarize"},
                    "inputs": {"texts": "$step.fetch.messages"},
                    "outputs": {"summary": "$outputs.summary"}
                }
            ]),
            json!({"type": "object", "required": ["folder"], "properties": {"folder": {"type": "string"}}}),
            json!({"type": "object", "required": ["summary"], "properties": {"summary": {"type": "string"}}}),
        );
        (vec![fetch, summarize], pipe)
    }

    #[test]
    fn test_valid_pipeline_computes_closure() {
        let (ops, pipe) = two_step_fixture();
        let lookup = PipelineLookup::new(&[], &ops);
        let (errors, closure) = validate_pipeline(&pipe, &lookup);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        let expected: BTreeSet<CapabilityId> = ["mail.read", "llm.generate"]
            .iter()
            .map(|id| CapabilityId::from_raw(*id))
            .collect();
        assert_eq!(closure, expected);
    }

    #[test]
    fn test_unknown_target_reported() {
        let (_, pipe) = two_step_fixture();
        let lookup = PipelineLookup::new(&[], &[]);
        let (errors, _) = validate_pipeline(&pipe, &lookup);
        assert!(errors.iter().any(|e| e.contains("unknown op fetch_messages")));
    }

    #[test]
    fn test_missing_required_input_reported() {
        let (ops, _) = two_step_fixture();
        let pipe = pipeline(
            json!([{
                "id": "fetch",
                "target": {"kind": "op", "name": "fetch_messages"},
                "inputs": {},
                "outputs": {}
            }]),
            json!({"type": "object"}),
            json!({"type": "object"}),
        );
        let lookup = PipelineLookup::new(&[], &ops);
        let (errors, _) = validate_pipeline(&pipe, &lookup);
        assert!(errors.iter().any(|e| e.contains("missing required inputs")));
    }

    #[test]
    fn test_incompatible_wiring_reported() {
        let (ops, _) = two_step_fixture();
        // `folder` input wired from an integer pipeline input.
        let pipe = pipeline(
            json!([{
                "id": "fetch",
                "target": {"kind": "op", "name": "fetch_messages"},
                "inputs": {"folder": "$inputs.count"},
                "outputs": {}
            }]),
            json!({"type": "object", "properties": {"count": {"type": "integer"}}}),
            json!({"type": "object"}),
        );
        let lookup = PipelineLookup::new(&[], &ops);
        let (errors, _) = validate_pipeline(&pipe, &lookup);
        assert!(errors.iter().any(|e| e.contains("incompatible")));
    }

    #[test]
    fn test_forward_step_reference_reported() {
        let (ops, _) = two_step_fixture();
        let pipe = pipeline(
            json!([{
                "id": "digest",
                "target": {"kind": "op", "name": "summarize"},
                "inputs": {"texts": "$step.later.messages"},
                "outputs": {}
            }]),
            json!({"type": "object"}),
            json!({"type": "object"}),
        );
        let lookup = PipelineLookup::new(&[], &ops);
        let (errors, _) = validate_pipeline(&pipe, &lookup);
        assert!(errors.iter().any(|e| e.contains("unknown step output later")));
    }

    #[test]
    fn test_required_pipeline_outputs_must_be_mapped() {
        let (ops, _) = two_step_fixture();
        let pipe = pipeline(
            json!([{
                "id": "fetch",
                "target": {"kind": "op", "name": "fetch_messages"},
                "inputs": {"folder": "$inputs.folder"},
                "outputs": {}
            }]),
            json!({"type": "object", "properties": {"folder": {"type": "string"}}}),
            json!({"type": "object", "required": ["summary"], "properties": {"summary": {"type": "string"}}}),
        );
        let lookup = PipelineLookup::new(&[], &ops);
        let (errors, _) = validate_pipeline(&pipe, &lookup);
        assert!(errors.iter().any(|e| e.contains("missing required fields")));
    }
}
