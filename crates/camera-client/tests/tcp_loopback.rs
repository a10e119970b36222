//! End-to-end test over a loopback TCP camera host

use camera_bridge::protocol::{
    CameraRequest, CameraResponse, DoCommandResponse, Envelope, GetImageResponse, RpcError,
    deserialize, serialize,
};
use camera_bridge::{AsyncReader, AsyncWriter, FrameReader, FrameWriter, TcpConfig};
use camera_client::{CameraClient, Scope};
use camera_core::{CameraError, WireProperties, codec, error_codes, mime};
use serde_json::{Map, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn answer(request: CameraRequest) -> CameraResponse {
    match request {
        CameraRequest::GetImage(req) if req.name == "front" => {
            let depth = codec::encode_raw_depth(2, 1, &[1000, 2000]).unwrap();
            CameraResponse::Image(GetImageResponse {
                mime_type: mime::MIME_TYPE_RAW_DEPTH.into(),
                image: depth,
            })
        }
        CameraRequest::GetProperties(req) if req.name == "front" => {
            CameraResponse::Properties(WireProperties {
                mime_types: vec![mime::MIME_TYPE_RAW_DEPTH.into()],
                ..Default::default()
            })
        }
        CameraRequest::DoCommand(req) if !req.command.is_empty() => {
            CameraResponse::CommandResult(DoCommandResponse {
                result: req.command,
            })
        }
        CameraRequest::DoCommand(_) => CameraResponse::Error(RpcError {
            code: error_codes::INVALID_REQUEST,
            message: "empty command".into(),
        }),
        other => CameraResponse::Error(RpcError {
            code: error_codes::UNKNOWN_RESOURCE,
            message: format!("cannot serve {}", other.kind()),
        }),
    }
}

/// Accept one connection and answer every request, each on its own task
async fn spawn_host() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half, 1024 * 1024);
        let writer = Arc::new(tokio::sync::Mutex::new(FrameWriter::new(write_half)));

        while let Ok(data) = reader.read_message().await {
            let request: Envelope<CameraRequest> = deserialize(&data).unwrap();
            let writer = writer.clone();
            tokio::spawn(async move {
                let reply = serialize(&Envelope {
                    id: request.id,
                    body: answer(request.body),
                })
                .unwrap();
                let _ = writer.lock().await.write_message(&reply).await;
            });
        }
    });

    address
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_over_tcp() {
    let address = spawn_host().await;
    let config = TcpConfig::with_address(address).with_timeout(Duration::from_secs(5));
    let connection = Arc::new(camera_bridge::connect(&config).await.unwrap());
    let client = CameraClient::new("front", connection.clone());

    let image = client
        .read(&Scope::new().with_mime_hint("image/x-raw-depth"))
        .await
        .unwrap();
    assert_eq!(image.mime_type(), mime::MIME_TYPE_RAW_DEPTH);
    assert_eq!(image.dimensions().unwrap(), (2, 1));
    let pixels = image.pixels().unwrap().to_luma16();
    assert_eq!(pixels.get_pixel(1, 0).0, [2000]);

    let props = client.properties(&Scope::new()).await.unwrap();
    assert_eq!(props.mime_types, vec![mime::MIME_TYPE_RAW_DEPTH.to_string()]);
    assert!(props.intrinsics.is_none());

    let mut command = Map::new();
    command.insert("ping".into(), json!(true));
    let result = client.do_command(&Scope::new(), command).await.unwrap();
    assert_eq!(result.get("ping"), Some(&json!(true)));

    let err = client
        .do_command(&Scope::new(), Map::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CameraError::Rpc {
            code: error_codes::INVALID_REQUEST,
            message: "empty command".into()
        }
    );

    let err = client.images(&Scope::new()).await.unwrap_err();
    assert!(matches!(
        err,
        CameraError::Rpc {
            code: error_codes::UNKNOWN_RESOURCE,
            ..
        }
    ));

    let mut stream = client.stream(&Scope::new(), Vec::new()).await.unwrap();
    for _ in 0..3 {
        let frame = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(frame.is_lazy());
    }
    client.close().await;
    assert!(stream.next().await.is_none());
    assert!(!connection.is_closed());
}
