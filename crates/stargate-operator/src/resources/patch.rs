use serde::Serialize;
use serde_json::{Value, json};
use tracing::trace;

use k8_diff::{Changes, Diff};

use crate::metadata::StoreError;

/// Merge patch turning `observed` into `desired`, `None` if they are the same.
///
/// Keys present in `observed` but gone from `desired` are set to null so the
/// merge removes them.
pub fn spec_patch<S: Serialize>(observed: &S, desired: &S) -> Result<Option<Value>, StoreError> {
    let old = serde_json::to_value(observed)?;
    let new = serde_json::to_value(desired)?;

    match old.diff(&new)? {
        Diff::None => Ok(None),
        Diff::Patch(p) => {
            let mut patch = serde_json::to_value(p)?;
            mark_removed(&old, &new, &mut patch);
            trace!(%patch, "spec patch");
            Ok(Some(patch))
        }
        _ => Ok(Some(new)),
    }
}

fn mark_removed(old: &Value, new: &Value, patch: &mut Value) {
    let (Value::Object(old), Value::Object(new), Value::Object(patch)) = (old, new, patch) else {
        return;
    };

    for (key, old_value) in old {
        match new.get(key) {
            None => {
                patch.insert(key.clone(), Value::Null);
            }
            Some(new_value) if new_value != old_value => {
                if let Some(child) = patch.get_mut(key) {
                    mark_removed(old_value, new_value, child);
                }
            }
            Some(_) => {}
        }
    }
}

/// patch of the whole object, managed labels and annotations are merged into the existing ones
pub fn object_patch<L, A>(labels: L, annotations: A, spec: Option<Value>) -> Value
where
    L: Serialize,
    A: Serialize,
{
    let mut patch = json!({
        "metadata": {
            "labels": labels,
            "annotations": annotations,
        }
    });
    if let Some(spec) = spec {
        patch["spec"] = spec;
    }
    patch
}

#[cfg(test)]
mod test {

    use serde_json::json;

    use super::{object_patch, spec_patch};

    #[test]
    fn test_no_change() {
        let spec = json!({"replicas": 1, "selector": {"matchLabels": {"a": "b"}}});
        assert!(spec_patch(&spec, &spec.clone()).expect("diff").is_none());
    }

    #[test]
    fn test_changed_and_removed_fields() {
        let observed = json!({
            "replicas": 1,
            "template": {
                "spec": {
                    "affinity": {"nodeAffinity": {}},
                    "serviceAccountName": "stargate",
                    "containers": [{"name": "stargate", "image": "a"}]
                }
            }
        });
        let desired = json!({
            "replicas": 3,
            "template": {
                "spec": {
                    "serviceAccountName": "stargate",
                    "containers": [{"name": "stargate", "image": "b"}]
                }
            }
        });

        let patch = spec_patch(&observed, &desired).expect("diff").expect("patch");
        assert_eq!(patch["replicas"], 3);
        assert!(patch["template"]["spec"]["affinity"].is_null());
        assert!(
            patch["template"]["spec"]
                .as_object()
                .expect("object")
                .contains_key("affinity"),
            "removal is explicit"
        );
        assert_eq!(patch["template"]["spec"]["containers"][0]["image"], "b");
        assert!(
            !patch["template"]["spec"]
                .as_object()
                .expect("object")
                .contains_key("serviceAccountName"),
            "unchanged fields are not sent"
        );
    }

    #[test]
    fn test_object_patch() {
        let patch = object_patch(
            json!({"k8ssandra.io/stargate": "sg"}),
            json!({"k8ssandra.io/resource-hash": "abc"}),
            Some(json!({"replicas": 2})),
        );
        assert_eq!(patch["metadata"]["labels"]["k8ssandra.io/stargate"], "sg");
        assert_eq!(patch["spec"]["replicas"], 2);

        let patch = object_patch(json!({}), json!({}), None);
        assert!(patch.get("spec").is_none());
    }
}
