//! Ambiguity & validity checks for resolved models.

use std::collections::HashMap;

use crate::diagnostics::Diagnostics;

use super::{InitDescriptor, InitPlacement, IntentDescriptor, ModelDescriptor};

/// Names shared by more than one intent of a model, in first-seen order.
pub fn duplicate_intent_names(intents: &[IntentDescriptor]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for intent in intents {
        let count = counts.entry(intent.name.as_str()).or_insert(0);
        if *count == 0 {
            order.push(intent.name.as_str());
        }
        *count += 1;
    }

    order
        .into_iter()
        .filter(|name| counts[name] != 1)
        .map(str::to_string)
        .collect()
}

/// Reports one error per intent name that is not unique within the model.
/// Returns the offending names.
pub fn check_intent_names(model: &ModelDescriptor, sink: &mut Diagnostics) -> Vec<String> {
    let duplicates = duplicate_intent_names(&model.intents);

    for name in &duplicates {
        sink.error(
            Some(&model.qualified_name),
            format!("Intent name {} must be unique. Please rename the intent.", name),
        );
    }

    duplicates
}

/// Validates the init function of a model. `false` means no init wrapper may
/// be generated.
pub fn check_init(
    init: Option<&InitDescriptor>,
    model: &ModelDescriptor,
    sink: &mut Diagnostics,
) -> bool {
    let Some(init) = init else {
        sink.error(
            Some(&model.qualified_name),
            format!(
                "Init function not found. Please define init function for {} model, then add @Init annotation to init function.",
                model.name
            ),
        );
        return false;
    };

    if let InitPlacement::Nested { parent } = &init.placement {
        sink.error(
            Some(&init.qualified_name),
            format!(
                "Init function must be static. Use companion object instead of {}.",
                parent
            ),
        );
        return false;
    }

    true
}

/// Warns about generic models. Their star-projected type has no runtime
/// serializer, so the generated save/load functions fail when called.
/// Returns `false` for generic models.
pub fn check_model_type(model: &ModelDescriptor, sink: &mut Diagnostics) -> bool {
    if model.ty.arguments.is_empty() {
        return true;
    }

    sink.warning(
        Some(&model.qualified_name),
        format!(
            "Model {} has type parameters. Generic models cannot be serialized by the generated save and load functions.",
            model.name
        ),
    );
    false
}
