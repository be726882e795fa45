//! Wire messages of the report RPC service.
//!
//! Every frame carries an [`RpcRequest`] or [`RpcResponse`] envelope whose
//! `payload` is the encoding of the method's request or response message.

use std::collections::HashMap;

use workplanner_core as model;

/// Status codes, numbered as in gRPC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Code {
    Ok = 0,
    InvalidArgument = 3,
    NotFound = 5,
    ResourceExhausted = 8,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    Unauthenticated = 16,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcRequest {
    #[prost(string, tag = "1")]
    pub method: String,
    #[prost(map = "string, string", tag = "2")]
    pub metadata: HashMap<String, String>,
    #[prost(bytes = "vec", tag = "3")]
    pub payload: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcResponse {
    #[prost(enumeration = "Code", tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(bytes = "vec", tag = "3")]
    pub payload: Vec<u8>,
    /// Set on every frame of a streamed reply except the last.
    #[prost(bool, tag = "4")]
    pub more: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ManagerRequest {
    #[prost(int64, tag = "1")]
    pub manager_id: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HtmlResponse {
    #[prost(string, tag = "1")]
    pub html: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PdfResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub pdf: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Chart {
    #[prost(string, tag = "1")]
    pub filename: String,
    #[prost(string, tag = "2")]
    pub title: String,
    /// Base64 text of the PNG bytes; empty when the chart is unavailable.
    #[prost(string, tag = "3")]
    pub data: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ManagerReport {
    #[prost(int64, tag = "1")]
    pub manager_id: i64,
    #[prost(string, optional, tag = "2")]
    pub manager_name: Option<String>,
    #[prost(string, tag = "3")]
    pub html: String,
    #[prost(bytes = "vec", tag = "4")]
    pub pdf: Vec<u8>,
    #[prost(message, repeated, tag = "5")]
    pub charts: Vec<Chart>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ReportList {
    #[prost(message, repeated, tag = "1")]
    pub reports: Vec<ManagerReport>,
}

impl From<model::Chart> for Chart {
    fn from(c: model::Chart) -> Self {
        Self {
            filename: c.filename,
            title: c.title,
            data: c.data,
        }
    }
}

impl From<Chart> for model::Chart {
    fn from(c: Chart) -> Self {
        Self {
            filename: c.filename,
            title: c.title,
            data: c.data,
        }
    }
}

impl From<model::ManagerReport> for ManagerReport {
    fn from(r: model::ManagerReport) -> Self {
        Self {
            manager_id: r.manager_id,
            manager_name: r.manager_name,
            html: r.html,
            pdf: r.pdf,
            charts: r.charts.into_iter().map(Chart::from).collect(),
        }
    }
}

impl From<ManagerReport> for model::ManagerReport {
    fn from(r: ManagerReport) -> Self {
        Self {
            manager_id: r.manager_id,
            manager_name: r.manager_name,
            html: r.html,
            pdf: r.pdf,
            charts: r.charts.into_iter().map(model::Chart::from).collect(),
        }
    }
}

impl RpcResponse {
    pub fn ok(payload: Vec<u8>) -> Self {
        Self {
            code: Code::Ok as i32,
            message: String::new(),
            payload,
            more: false,
        }
    }

    /// One element of a streamed reply.
    pub fn item(payload: Vec<u8>) -> Self {
        Self {
            more: true,
            ..Self::ok(payload)
        }
    }

    pub fn status(code: Code, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
            payload: Vec::new(),
            more: false,
        }
    }

    /// Decoded status code; unknown values read as `Internal`.
    pub fn status_code(&self) -> Code {
        Code::try_from(self.code).unwrap_or(Code::Internal)
    }
}
