#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoControl {
    #[prost(string, tag = "1")]
    pub oid: ::prost::alloc::string::String,
    #[prost(bool, tag = "2")]
    pub critical: bool,
    #[prost(bytes = "vec", tag = "3")]
    pub value: ::prost::alloc::vec::Vec<u8>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoSearchRequest {
    #[prost(string, tag = "1")]
    pub base_dn: ::prost::alloc::string::String,
    #[prost(enumeration = "ProtoScope", tag = "2")]
    pub scope: i32,
    #[prost(string, tag = "3")]
    pub filter: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "4")]
    pub attributes: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(message, repeated, tag = "5")]
    pub controls: ::prost::alloc::vec::Vec<ProtoControl>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoAttribute {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "2")]
    pub values: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoSearchEntry {
    #[prost(string, tag = "1")]
    pub dn: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub attributes: ::prost::alloc::vec::Vec<ProtoAttribute>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoSearchResult {
    #[prost(uint32, tag = "1")]
    pub result_code: u32,
    #[prost(string, tag = "2")]
    pub diagnostic_message: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "3")]
    pub entries: ::prost::alloc::vec::Vec<ProtoSearchEntry>,
}
// ---- Control payloads ----

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoHeartbeat {}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoAppendEntriesControl {
    #[prost(uint32, tag = "1")]
    pub term: u32,
    #[prost(string, tag = "2")]
    pub leader: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub pre_log_index: u64,
    #[prost(uint32, tag = "4")]
    pub pre_log_term: u32,
    #[prost(uint64, tag = "5")]
    pub leader_commit: u64,
    #[prost(oneof = "proto_append_entries_control::Payload", tags = "6, 7")]
    pub payload: ::core::option::Option<proto_append_entries_control::Payload>,
}
/// Nested message and enum types in `ProtoAppendEntriesControl`.
pub mod proto_append_entries_control {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "6")]
        Heartbeat(super::ProtoHeartbeat),
        #[prost(bytes, tag = "7")]
        LogRecord(::prost::alloc::vec::Vec<u8>),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoRequestVoteControl {
    #[prost(uint32, tag = "1")]
    pub term: u32,
    #[prost(string, tag = "2")]
    pub candidate_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub last_log_index: u64,
    #[prost(uint32, tag = "4")]
    pub last_log_term: u32,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoInitiateVoteControl {
    #[prost(string, tag = "1")]
    pub requested_by: ::prost::alloc::string::String,
}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ProtoScope {
    BaseObject = 0,
    SingleLevel = 1,
    WholeSubtree = 2,
}
#[doc = r" Generated client implementations."]
pub mod directory_service_client {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = " Replica-to-replica traffic rides on the directory search operation: a base-scope search against a"]
    #[doc = " well-known pseudo-DN, with the RPC arguments attached as a control."]
    pub struct DirectoryServiceClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl DirectoryServiceClient<tonic::transport::Channel> {
        #[doc = r" Attempt to create a new client by connecting to a given endpoint."]
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: std::convert::TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> DirectoryServiceClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::ResponseBody: Body + HttpBody + Send + 'static,
        T::Error: Into<StdError>,
        <T::ResponseBody as HttpBody>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = tonic::client::Grpc::with_interceptor(inner, interceptor);
            Self { inner }
        }
        pub async fn search(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoSearchRequest>,
        ) -> Result<tonic::Response<super::ProtoSearchResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/dirraft.DirectoryService/Search");
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
    impl<T: Clone> Clone for DirectoryServiceClient<T> {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }
    impl<T> std::fmt::Debug for DirectoryServiceClient<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "DirectoryServiceClient {{ ... }}")
        }
    }
}
#[doc = r" Generated server implementations."]
pub mod directory_service_server {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = "Generated trait containing gRPC methods that should be implemented for use with DirectoryServiceServer."]
    #[async_trait]
    pub trait DirectoryService: Send + Sync + 'static {
        async fn search(
            &self,
            request: tonic::Request<super::ProtoSearchRequest>,
        ) -> Result<tonic::Response<super::ProtoSearchResult>, tonic::Status>;
    }
    #[doc = " Replica-to-replica traffic rides on the directory search operation: a base-scope search against a"]
    #[doc = " well-known pseudo-DN, with the RPC arguments attached as a control."]
    #[derive(Debug)]
    pub struct DirectoryServiceServer<T: DirectoryService> {
        inner: _Inner<T>,
    }
    struct _Inner<T>(Arc<T>, Option<tonic::Interceptor>);
    impl<T: DirectoryService> DirectoryServiceServer<T> {
        pub fn new(inner: T) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, None);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, Some(interceptor.into()));
            Self { inner }
        }
    }
    impl<T, B> Service<http::Request<B>> for DirectoryServiceServer<T>
    where
        T: DirectoryService,
        B: HttpBody + Send + Sync + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = Never;
        type Future = BoxFuture<Self::Response, Self::Error>;
        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/dirraft.DirectoryService/Search" => {
                    #[allow(non_camel_case_types)]
                    struct SearchSvc<T: DirectoryService>(pub Arc<T>);
                    impl<T: DirectoryService> tonic::server::UnaryService<super::ProtoSearchRequest> for SearchSvc<T> {
                        type Response = super::ProtoSearchResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoSearchRequest>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).search(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = SearchSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(tonic::body::BoxBody::empty())
                        .unwrap())
                }),
            }
        }
    }
    impl<T: DirectoryService> Clone for DirectoryServiceServer<T> {
        fn clone(&self) -> Self {
            let inner = self.inner.clone();
            Self { inner }
        }
    }
    impl<T: DirectoryService> Clone for _Inner<T> {
        fn clone(&self) -> Self {
            Self(self.0.clone(), self.1.clone())
        }
    }
    impl<T: std::fmt::Debug> std::fmt::Debug for _Inner<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }
    impl<T: DirectoryService> tonic::transport::NamedService for DirectoryServiceServer<T> {
        const NAME: &'static str = "dirraft.DirectoryService";
    }
}
