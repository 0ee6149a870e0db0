//! Integration tests for the validation pipeline and response shaping.
//!
//! These run entirely without a database: the pipeline produces typed
//! parameters, the parameter mapping carries them toward the executor, and
//! failures render as the JSON error envelope.

use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use sproc_gateway::crud::shape::coerce;
use sproc_gateway::http::response::{error_envelope, success_envelope};
use sproc_gateway::{
    ApiError, CrudController, CrudPermission, JsonShape, Operation, ParamMap, ProcParam,
    RawRequest,
};

#[derive(Debug, serde::Serialize, Deserialize, garde::Validate)]
struct UserParams {
    #[serde(deserialize_with = "coerce::lenient_i64")]
    #[garde(range(min = 1))]
    id: i64,
    #[garde(length(min = 1))]
    name: String,
}

fn controller() -> CrudController {
    CrudController::new(vec![
        CrudPermission::new("user", Operation::Create),
        CrudPermission::new("user", Operation::Read),
        CrudPermission::new("user", Operation::Update),
    ])
}

#[tokio::test]
async fn test_request_flows_from_raw_input_to_param_map() {
    // Path carries id 5, body overrides with id 7 and adds the name.
    let request = RawRequest::new()
        .with_path_param("id", "5")
        .with_body(json!({"id": "7", "name": "Ann"}));

    let validated = controller()
        .update(&request, &JsonShape::<UserParams>::new())
        .await
        .unwrap();

    assert_eq!(validated.params.id, 7);
    assert_eq!(validated.params.name, "Ann");
    assert_eq!(validated.credential.account_id, 1);

    // The typed params become the executor's parameter mapping.
    let params = ParamMap::from_object(&serde_json::to_value(&validated.params).unwrap());
    assert_eq!(params.get("id"), Some(&ProcParam::Int(7)));
    assert_eq!(
        params.get("name"),
        Some(&ProcParam::String("Ann".to_string()))
    );
}

#[tokio::test]
async fn test_rejected_request_renders_validation_envelope() {
    let request = RawRequest::new().with_body(json!({"id": "not-a-number", "name": "Ann"}));

    let err = controller()
        .read(&request, &JsonShape::<UserParams>::new())
        .await
        .unwrap_err();

    let response = err.into_response();
    assert_eq!(response.status(), 400);

    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let envelope: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(envelope["success"], json!(false));
    assert_eq!(envelope["error"]["code"], json!("VALIDATION_ERROR"));
    assert!(envelope["error"]["details"].as_array().is_some_and(|d| !d.is_empty()));
    assert!(envelope["timestamp"].is_string());
}

#[tokio::test]
async fn test_denied_operation_renders_permission_envelope() {
    let request = RawRequest::new().with_body(json!({"id": 1, "name": "Ann"}));

    let err = controller()
        .delete(&request, &JsonShape::<UserParams>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::PermissionDenied { .. }));

    let response = err.into_response();
    assert_eq!(response.status(), 403);
}

#[test]
fn test_envelope_helpers_match_wire_contract() {
    let ok = success_envelope(json!([{"id": 7}]), Some(json!({"total": 1})));
    assert_eq!(ok["success"], json!(true));
    assert_eq!(ok["data"][0]["id"], json!(7));
    assert_eq!(ok["metadata"]["total"], json!(1));
    assert!(ok["metadata"]["timestamp"].is_string());

    let fail = error_envelope("not found", Some("NOT_FOUND"));
    assert_eq!(fail["success"], json!(false));
    assert_eq!(fail["error"]["code"], json!("NOT_FOUND"));
    assert!(fail["timestamp"].is_string());
}
