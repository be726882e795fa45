use std::collections::HashMap;

use prost::Message;
use tokio::net::{TcpStream, ToSocketAddrs};

use workplanner_core::{ManagerId, ManagerReport};

use super::proto::{self, Code, RpcRequest, RpcResponse};
use super::{read_frame, write_frame, RpcError, RpcMethod, AUTHORIZATION_KEY, MAX_FRAME_LEN};

/// Client for the report RPC service over one persistent connection.
pub struct RpcClient {
    stream: TcpStream,
    token: Option<String>,
    max_frame_len: usize,
}

impl RpcClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, RpcError> {
        Ok(Self {
            stream: TcpStream::connect(addr).await?,
            token: None,
            max_frame_len: MAX_FRAME_LEN,
        })
    }

    /// Sends `Bearer <token>` with every call.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sends a raw method call and returns the decoded response payload.
    pub async fn call<Req, Resp>(&mut self, method: &str, request: &Req) -> Result<Resp, RpcError>
    where
        Req: Message,
        Resp: Message + Default,
    {
        self.send(method, request).await?;
        let response = self.receive().await?;
        Ok(Resp::decode(response.payload.as_slice())?)
    }

    /// Sends a method call whose reply is streamed and collects every item.
    pub async fn call_stream<Req, Item>(
        &mut self,
        method: &str,
        request: &Req,
    ) -> Result<Vec<Item>, RpcError>
    where
        Req: Message,
        Item: Message + Default,
    {
        self.send(method, request).await?;
        let mut items = Vec::new();
        loop {
            let response = self.receive().await?;
            if !response.more {
                return Ok(items);
            }
            items.push(Item::decode(response.payload.as_slice())?);
        }
    }

    async fn send<Req: Message>(&mut self, method: &str, request: &Req) -> Result<(), RpcError> {
        let mut metadata = HashMap::new();
        if let Some(token) = &self.token {
            metadata.insert(AUTHORIZATION_KEY.to_string(), format!("Bearer {token}"));
        }
        let envelope = RpcRequest {
            method: method.to_string(),
            metadata,
            payload: request.encode_to_vec(),
        };
        write_frame(&mut self.stream, &envelope.encode_to_vec(), self.max_frame_len).await
    }

    /// Next response frame; a non-`Ok` status becomes an error.
    async fn receive(&mut self) -> Result<RpcResponse, RpcError> {
        let frame = read_frame(&mut self.stream, self.max_frame_len)
            .await?
            .ok_or(RpcError::Closed)?;
        let response = RpcResponse::decode(frame.as_slice())?;
        match response.status_code() {
            Code::Ok => Ok(response),
            code => Err(RpcError::Status {
                code,
                message: response.message,
            }),
        }
    }

    pub async fn get_manager_html(&mut self, manager_id: ManagerId) -> Result<String, RpcError> {
        let resp: proto::HtmlResponse = self
            .call(RpcMethod::GetManagerHtml.name(), &proto::ManagerRequest { manager_id })
            .await?;
        Ok(resp.html)
    }

    pub async fn get_manager_pdf(&mut self, manager_id: ManagerId) -> Result<Vec<u8>, RpcError> {
        let resp: proto::PdfResponse = self
            .call(RpcMethod::GetManagerPdf.name(), &proto::ManagerRequest { manager_id })
            .await?;
        Ok(resp.pdf)
    }

    pub async fn get_all_reports_of_manager(
        &mut self,
        manager_id: ManagerId,
    ) -> Result<Vec<ManagerReport>, RpcError> {
        let resp: proto::ReportList = self
            .call(
                RpcMethod::GetAllReportsOfManager.name(),
                &proto::ManagerRequest { manager_id },
            )
            .await?;
        Ok(resp.reports.into_iter().map(ManagerReport::from).collect())
    }

    /// Every manager's report, received one frame per report.
    pub async fn get_all_manager_reports(&mut self) -> Result<Vec<ManagerReport>, RpcError> {
        let reports: Vec<proto::ManagerReport> = self
            .call_stream(RpcMethod::GetAllManagerReports.name(), &proto::Empty {})
            .await?;
        Ok(reports.into_iter().map(ManagerReport::from).collect())
    }
}
