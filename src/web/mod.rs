//! Web层：HTTP路由、请求响应类型与服务循环
//!
//! 页面与接口都走同一个hyper服务：`/`返回嵌入的单页UI，`/api/*`
//! 承载树快照、编辑与查询。会话状态由互斥锁串行化，一次编辑
//! 处理到底再接下一个请求。查询带令牌进出：落后于编辑的结果
//! 在服务端复核作废，页面端再按回传令牌兜底丢弃。

pub mod table;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::model::data_core::{AppError, AppState};
use crate::utils::fs::list_json_files;

/// 嵌入的单页UI，含初始数据占位符
const INDEX_HTML: &str = include_str!("index.html");

pub type SharedState = Arc<Mutex<AppState>>;

#[derive(Error, Debug)]
pub enum WebError {
    #[error("读取请求体失败: {0}")]
    Body(#[from] hyper::Error),
    #[error("响应构建失败: {0}")]
    Http(#[from] hyper::http::Error),
}

// === 请求与响应类型 ===

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub data: Option<Value>,
    pub expression: String,
    #[serde(default)]
    pub format: String,
    pub token: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded: Option<bool>,
    /// 回传请求令牌，页面端据此丢弃落后于最新编辑的响应
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<u64>,
}

impl QueryResponse {
    fn ok(result: String, token: Option<u64>) -> Self {
        Self { result, error: None, superseded: None, token }
    }

    fn err(msg: impl Into<String>, token: Option<u64>) -> Self {
        Self { result: String::new(), error: Some(msg.into()), superseded: None, token }
    }

    fn superseded(token: Option<u64>) -> Self {
        Self { result: String::new(), error: None, superseded: Some(true), token }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    pub files: Vec<String>,
    pub current_file: String,
    pub dir_path: String,
}

#[derive(Debug, Deserialize)]
pub struct LoadFileRequest {
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct LoadFileResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    pub action: String,
    pub address: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(default)]
    pub insert_after: bool,
    pub target: Option<String>,
    pub compress: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct EditResponse {
    pub tree: Value,
    pub expression: String,
    pub applied: bool,
    pub token: u64,
}

#[derive(Debug, Serialize)]
pub struct TreeResponse {
    pub tree: Value,
    pub expression: String,
    pub token: u64,
}

// === 服务循环 ===

/// 启动HTTP服务并接受连接，每个连接一个任务
pub async fn serve(addr: SocketAddr, state: SharedState) -> Result<(), AppError> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("HTTP服务已启动: http://{}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let io = TokioIo::new(stream);
                let service = WebService { state: state.clone() };
                tokio::spawn(async move {
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        tracing::debug!("连接处理出错: {:?}", e);
                    }
                });
            }
            Err(e) => {
                tracing::warn!("接受连接失败: {:?}", e);
            }
        }
    }
}

struct WebService {
    state: SharedState,
}

impl Service<Request<Incoming>> for WebService {
    type Response = Response<Full<Bytes>>;
    type Error = WebError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let state = self.state.clone();
        Box::pin(async move { handle_request(state, req).await })
    }
}

async fn handle_request(
    state: SharedState,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, WebError> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    tracing::debug!("请求: {} {}", method, path);

    match (method, path.as_str()) {
        (Method::GET, "/") => index_page(&state).await,
        (Method::GET, "/api/files") => list_files(&state).await,
        (Method::GET, "/api/tree") => tree_snapshot(&state).await,
        (Method::POST, "/api/load") => {
            let body = read_body(req).await?;
            match serde_json::from_slice::<LoadFileRequest>(&body) {
                Ok(parsed) => load_file(&state, parsed).await,
                Err(e) => json_response(
                    StatusCode::OK,
                    &LoadFileResponse { data: None, error: Some(format!("请求解析失败: {}", e)) },
                ),
            }
        }
        (Method::POST, "/api/edit") => {
            let body = read_body(req).await?;
            match serde_json::from_slice::<EditRequest>(&body) {
                Ok(parsed) => apply_edit(&state, parsed).await,
                Err(e) => json_error(StatusCode::OK, &format!("请求解析失败: {}", e)),
            }
        }
        (Method::POST, "/api/query") => {
            let body = read_body(req).await?;
            match serde_json::from_slice::<QueryRequest>(&body) {
                Ok(parsed) => run_query(&state, parsed).await,
                Err(e) => json_response(
                    StatusCode::OK,
                    &QueryResponse::err(format!("请求解析失败: {}", e), None),
                ),
            }
        }
        (_, "/api/load") | (_, "/api/edit") | (_, "/api/query") => {
            json_error(StatusCode::METHOD_NOT_ALLOWED, "不支持的请求方法")
        }
        _ => json_error(StatusCode::NOT_FOUND, "未找到"),
    }
}

// === 路由处理 ===

async fn index_page(state: &SharedState) -> Result<Response<Full<Bytes>>, WebError> {
    let st = state.lock().await;
    let initial = st
        .dom
        .as_ref()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "null".to_string());
    let dir_mode = st.dir_path.is_some();
    let current = st.current_file.clone().unwrap_or_default();
    drop(st);

    let page = render_index(&initial, dir_mode, &current);
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(Full::new(Bytes::from(page)))?)
}

async fn list_files(state: &SharedState) -> Result<Response<Full<Bytes>>, WebError> {
    let st = state.lock().await;
    let (files, dir_display) = match st.dir_path.as_ref() {
        Some(dir) => (
            list_json_files(dir).unwrap_or_default(),
            dir.display().to_string(),
        ),
        None => (Vec::new(), String::new()),
    };
    let resp = FileListResponse {
        files,
        current_file: st.current_file.clone().unwrap_or_default(),
        dir_path: dir_display,
    };
    json_response(StatusCode::OK, &resp)
}

async fn tree_snapshot(state: &SharedState) -> Result<Response<Full<Bytes>>, WebError> {
    let st = state.lock().await;
    let resp = TreeResponse {
        tree: tree_value(&st),
        expression: st.expression(),
        token: st.gate.current(),
    };
    json_response(StatusCode::OK, &resp)
}

async fn load_file(
    state: &SharedState,
    req: LoadFileRequest,
) -> Result<Response<Full<Bytes>>, WebError> {
    let mut st = state.lock().await;
    let dir = match st.dir_path.clone() {
        Some(d) => d,
        None => {
            return json_response(
                StatusCode::OK,
                &LoadFileResponse { data: None, error: Some("非目录模式".to_string()) },
            );
        }
    };

    if !is_safe_filename(&req.filename) {
        tracing::warn!("拒绝可疑文件名: {}", req.filename);
        return json_response(
            StatusCode::OK,
            &LoadFileResponse { data: None, error: Some("无效的文件名".to_string()) },
        );
    }

    let path = dir.join(&req.filename);
    match st.load_file(&path) {
        Ok(()) => {
            st.current_file = Some(req.filename);
            let data = st.dom.clone();
            json_response(StatusCode::OK, &LoadFileResponse { data, error: None })
        }
        Err(e) => json_response(
            StatusCode::OK,
            &LoadFileResponse { data: None, error: Some(e.to_string()) },
        ),
    }
}

async fn apply_edit(
    state: &SharedState,
    edit: EditRequest,
) -> Result<Response<Full<Bytes>>, WebError> {
    let mut st = state.lock().await;
    let applied = match edit.action.as_str() {
        "select" => match edit.address.as_deref() {
            Some(addr) => st.toggle_selected(addr),
            None => return json_error(StatusCode::OK, "缺少address字段"),
        },
        "expand" => match edit.address.as_deref() {
            Some(addr) => st.toggle_expanded(addr),
            None => return json_error(StatusCode::OK, "缺少address字段"),
        },
        "reorder" => match (edit.from.as_deref(), edit.to.as_deref()) {
            (Some(from), Some(to)) => st.reorder(from, to, edit.insert_after),
            _ => return json_error(StatusCode::OK, "缺少from或to字段"),
        },
        "move" => match (edit.from.as_deref(), edit.target.as_deref()) {
            (Some(from), Some(target)) => st.move_into(from, target),
            _ => return json_error(StatusCode::OK, "缺少from或target字段"),
        },
        "compress" => match edit.compress {
            Some(v) => {
                st.set_compress(v);
                true
            }
            None => return json_error(StatusCode::OK, "缺少compress字段"),
        },
        other => {
            return json_error(StatusCode::OK, &format!("未知的编辑动作: {}", other));
        }
    };

    let resp = EditResponse {
        tree: tree_value(&st),
        expression: st.expression(),
        applied,
        token: st.gate.current(),
    };
    json_response(StatusCode::OK, &resp)
}

async fn run_query(
    state: &SharedState,
    req: QueryRequest,
) -> Result<Response<Full<Bytes>>, WebError> {
    let st = state.lock().await;
    if let Some(token) = req.token {
        if !st.gate.is_current(token) {
            tracing::debug!("查询令牌已过期: {}", token);
            return json_response(StatusCode::OK, &QueryResponse::superseded(req.token));
        }
    }

    let doc = match req.data {
        Some(d) => d,
        None => st.dom.clone().unwrap_or(Value::Null),
    };
    drop(st);

    let outcome = crate::engine::execute(&req.expression, &doc);

    // 执行期间不持锁，完成后复核令牌再回结果
    if let Some(token) = req.token {
        if !state.lock().await.gate.is_current(token) {
            tracing::debug!("查询完成时令牌已过期: {}", token);
            return json_response(StatusCode::OK, &QueryResponse::superseded(req.token));
        }
    }

    match outcome {
        Err(e) => json_response(StatusCode::OK, &QueryResponse::err(e.to_string(), req.token)),
        Ok(mut results) => {
            // 单个结果直接展开，多个结果打包成数组
            let value = if results.len() == 1 {
                results.remove(0)
            } else {
                Value::Array(results)
            };
            let rendered = match req.format.as_str() {
                "table" => table::render(&value).unwrap_or_else(|| pretty(&value)),
                _ => pretty(&value),
            };
            json_response(StatusCode::OK, &QueryResponse::ok(rendered, req.token))
        }
    }
}

// === 辅助函数 ===

/// 文件名防穿越检查
fn is_safe_filename(name: &str) -> bool {
    !name.contains("..") && !name.contains('/')
}

/// 把UI页面里的占位符替换为当前会话数据
fn render_index(initial_data: &str, dir_mode: bool, current_file: &str) -> String {
    INDEX_HTML
        .replacen("{{INITIAL_DATA}}", initial_data, 1)
        .replacen("{{DIR_MODE}}", if dir_mode { "true" } else { "false" }, 1)
        .replacen("{{CURRENT_FILE}}", current_file, 1)
}

fn tree_value(state: &AppState) -> Value {
    serde_json::to_value(state.tree.as_ref()).unwrap_or(Value::Null)
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

async fn read_body(req: Request<Incoming>) -> Result<Bytes, WebError> {
    use http_body_util::BodyExt;

    let collected = req.into_body().collect().await?;
    Ok(collected.to_bytes())
}

fn json_response<T: Serialize>(
    status: StatusCode,
    data: &T,
) -> Result<Response<Full<Bytes>>, WebError> {
    let body = serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string());
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))?)
}

fn json_error(status: StatusCode, msg: &str) -> Result<Response<Full<Bytes>>, WebError> {
    json_response(status, &serde_json::json!({ "error": msg }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shared(dom: Value) -> SharedState {
        let mut state = AppState::default();
        state.load_value(dom);
        Arc::new(Mutex::new(state))
    }

    async fn body_json(resp: Response<Full<Bytes>>) -> Value {
        use http_body_util::BodyExt;

        let bytes = resp
            .into_body()
            .collect()
            .await
            .expect("读取响应体失败")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("响应应该是JSON")
    }

    #[test]
    fn test_tree_snapshot_carries_expression_and_token() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let state = shared(json!({"a": 1}));
            let resp = tree_snapshot(&state).await.expect("快照应该成功");
            let body = body_json(resp).await;

            assert_eq!(body["expression"], ".", "未选择时表达式应该是恒等");
            assert!(body["token"].is_u64(), "响应应该携带当前令牌");
            assert_eq!(body["tree"]["address"], "$", "树根地址应该是$");
        });
    }

    #[test]
    fn test_edit_select_updates_expression() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let state = shared(json!({"a": 1, "b": 2}));
            let edit = EditRequest {
                action: "select".to_string(),
                address: Some("$.a".to_string()),
                from: None,
                to: None,
                insert_after: false,
                target: None,
                compress: None,
            };

            let resp = apply_edit(&state, edit).await.expect("编辑应该成功");
            let body = body_json(resp).await;

            assert_eq!(body["applied"], true, "选中叶子应该生效");
            assert_eq!(body["expression"], "{a: .a}");
        });
    }

    #[test]
    fn test_edit_unknown_action_reports_error() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let state = shared(json!({"a": 1}));
            let edit = EditRequest {
                action: "explode".to_string(),
                address: None,
                from: None,
                to: None,
                insert_after: false,
                target: None,
                compress: None,
            };

            let resp = apply_edit(&state, edit).await.expect("处理应该成功");
            let body = body_json(resp).await;
            assert!(
                body["error"].as_str().unwrap_or("").contains("未知的编辑动作"),
                "未知动作应该返回错误"
            );
        });
    }

    #[test]
    fn test_query_stale_token_is_superseded() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let state = shared(json!({"a": 1}));
            let stale = state.lock().await.gate.current();
            state.lock().await.toggle_selected("$.a");

            let req = QueryRequest {
                data: None,
                expression: ".".to_string(),
                format: String::new(),
                token: Some(stale),
            };
            let resp = run_query(&state, req).await.expect("查询应该成功");
            let body = body_json(resp).await;

            assert_eq!(body["superseded"], true, "过期令牌的查询应该被取代");
            assert_eq!(body["token"], stale, "被取代的响应也回传请求令牌");
            assert!(body.get("error").is_none(), "被取代不算错误");
        });
    }

    #[test]
    fn test_query_response_echoes_token() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let state = shared(json!({"a": 1, "b": 2}));
            let token = state.lock().await.gate.current();

            let req = QueryRequest {
                data: None,
                expression: ".b".to_string(),
                format: String::new(),
                token: Some(token),
            };
            let resp = run_query(&state, req).await.expect("查询应该成功");

            // 响应还没送达页面时编辑已推进令牌
            state.lock().await.toggle_selected("$.a");
            let latest = state.lock().await.gate.current();

            let body = body_json(resp).await;
            assert_eq!(body["result"], "2");
            assert_eq!(body["token"], token, "响应应该回传请求时的令牌");
            assert_ne!(
                body["token"].as_u64(),
                Some(latest),
                "落后于编辑的响应凭令牌即可识别并丢弃"
            );
        });
    }

    #[test]
    fn test_query_overtaken_while_running_is_superseded() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let state = shared(json!({"a": 1, "b": 2}));
            let token = state.lock().await.gate.current();

            // 先占住状态锁，让查询任务排队在到达检查之前
            let guard = state.lock().await;
            let task = {
                let state = state.clone();
                tokio::spawn(async move {
                    let req = QueryRequest {
                        data: None,
                        expression: ".".to_string(),
                        format: String::new(),
                        token: Some(token),
                    };
                    run_query(&state, req).await
                })
            };
            tokio::task::yield_now().await;

            // 锁按排队顺序交接：查询过到达检查后才轮到这里推进令牌
            drop(guard);
            let mut st = state.lock().await;
            st.toggle_selected("$.a");
            drop(st);

            let resp = task
                .await
                .expect("查询任务应该完成")
                .expect("查询应该成功");
            let body = body_json(resp).await;
            assert_eq!(body["superseded"], true, "执行期间被编辑赶超的查询应该作废");
            assert_eq!(body["token"], token, "作废响应回传请求令牌");
        });
    }

    #[test]
    fn test_query_executes_against_session_document() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let state = shared(json!({"name": "会话文档"}));
            let req = QueryRequest {
                data: None,
                expression: "{name: .name}".to_string(),
                format: String::new(),
                token: None,
            };

            let resp = run_query(&state, req).await.expect("查询应该成功");
            let body = body_json(resp).await;
            let result = body["result"].as_str().expect("结果应该是字符串");
            assert!(result.contains("会话文档"), "缺省时应该查询会话文档");
        });
    }

    #[test]
    fn test_query_table_format_falls_back_to_json() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let state = shared(json!({"rows": [{"x": 1}, {"x": 2}]}));

            let tabular = QueryRequest {
                data: Some(json!([{"x": 1}, {"x": 2}])),
                expression: ".".to_string(),
                format: "table".to_string(),
                token: None,
            };
            let resp = run_query(&state, tabular).await.expect("查询应该成功");
            let body = body_json(resp).await;
            assert!(
                body["result"].as_str().unwrap_or("").contains('┌'),
                "可成表的数据应该渲染为表格"
            );

            let scalar = QueryRequest {
                data: Some(json!(42)),
                expression: ".".to_string(),
                format: "table".to_string(),
                token: None,
            };
            let resp = run_query(&state, scalar).await.expect("查询应该成功");
            let body = body_json(resp).await;
            assert_eq!(body["result"], "42", "不可成表时应该退回JSON");
        });
    }

    #[test]
    fn test_query_engine_error_is_reported() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let state = shared(json!({"a": 1}));
            let req = QueryRequest {
                data: None,
                expression: ".a[0]".to_string(),
                format: String::new(),
                token: None,
            };

            let resp = run_query(&state, req).await.expect("处理应该成功");
            let body = body_json(resp).await;
            assert!(body["error"].is_string(), "语法之外的表达式应该返回错误信息");
        });
    }

    #[test]
    fn test_filename_traversal_guard() {
        assert!(is_safe_filename("data.json"));
        assert!(is_safe_filename("带中文.json"));
        assert!(!is_safe_filename("../etc/passwd"), "上级目录应该被拒绝");
        assert!(!is_safe_filename("a/b.json"), "路径分隔符应该被拒绝");
        assert!(!is_safe_filename("..json"), "包含..的名字一律拒绝");
    }

    #[test]
    fn test_load_file_outside_dir_mode_fails() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let state = shared(json!({"a": 1}));
            let req = LoadFileRequest { filename: "other.json".to_string() };

            let resp = load_file(&state, req).await.expect("处理应该成功");
            let body = body_json(resp).await;
            assert_eq!(body["error"], "非目录模式");
        });
    }

    #[test]
    fn test_index_substitutes_placeholders() {
        let page = render_index("{\"a\":1}", true, "demo.json");

        assert!(!page.contains("{{INITIAL_DATA}}"), "初始数据占位符应该被替换");
        assert!(!page.contains("{{DIR_MODE}}"), "目录模式占位符应该被替换");
        assert!(!page.contains("{{CURRENT_FILE}}"), "当前文件占位符应该被替换");
        assert!(page.contains("{\"a\":1}"), "页面应该嵌入初始数据");
        assert!(page.contains("demo.json"), "页面应该嵌入当前文件名");
    }

    #[test]
    fn test_edit_request_wire_shape() {
        let parsed: EditRequest = serde_json::from_str(
            r#"{"action": "reorder", "from": "$.a", "to": "$.b", "insertAfter": true}"#,
        )
        .expect("编辑请求应该能解析");

        assert_eq!(parsed.action, "reorder");
        assert!(parsed.insert_after, "insertAfter应该按小驼峰解析");

        let resp = FileListResponse {
            files: vec!["a.json".to_string()],
            current_file: "a.json".to_string(),
            dir_path: "/tmp".to_string(),
        };
        let text = serde_json::to_string(&resp).expect("序列化应该成功");
        assert!(text.contains("currentFile"), "响应字段应该是小驼峰");
        assert!(text.contains("dirPath"), "响应字段应该是小驼峰");
    }
}
