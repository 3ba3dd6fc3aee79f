use crate::channel::{dispatch, MethodCall, MethodResponse};
use crate::errors::CommandError;
use tauri::command;

/// Method-channel entry point: `{ method, arguments }` in, tagged response out
#[command]
pub async fn handle_method_call(call: MethodCall) -> Result<MethodResponse, CommandError> {
    Ok(dispatch(super::camera::global_bridge(), call).await)
}
