use esgf_point::{HttpSession, ResumableTransfer, TransferConfig, TransferOutcome};
use httpmock::prelude::*;
use httpmock::Method::HEAD;
use reqwest::Client;
use tempfile::TempDir;

fn payload() -> Vec<u8> {
    (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect()
}

fn transfer() -> ResumableTransfer {
    ResumableTransfer::new(
        HttpSession::anonymous(Client::new()),
        TransferConfig::builder()
            .chunk_size(1024)
            .upgrade_to_https(false)
            .build(),
    )
}

#[tokio::test]
async fn test_resume_after_interruption_matches_fresh_download() {
    let body = payload();
    let cut = body.len() * 40 / 100;

    let fresh_server = MockServer::start_async().await;
    fresh_server
        .mock_async(|when, then| {
            when.path("/tasmax.nc");
            then.status(200).body(body.clone());
        })
        .await;

    let resume_server = MockServer::start_async().await;
    resume_server
        .mock_async(|when, then| {
            when.method(HEAD).path("/tasmax.nc");
            then.status(200).body(body.clone());
        })
        .await;
    let ranged = resume_server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/tasmax.nc")
                .header("range", format!("bytes={cut}-"));
            then.status(206).body(body[cut..].to_vec());
        })
        .await;

    let dir = TempDir::new().unwrap();
    let fresh_path = dir.path().join("fresh/tasmax.nc");
    let fresh = transfer()
        .fetch_with_report(&fresh_server.url("/tasmax.nc"), &fresh_path)
        .await
        .unwrap();
    assert_eq!(
        fresh,
        TransferOutcome::Downloaded {
            bytes: body.len() as u64,
            resumed_from: 0
        }
    );

    let resumed_path = dir.path().join("resumed/tasmax.nc");
    std::fs::create_dir_all(resumed_path.parent().unwrap()).unwrap();
    std::fs::write(&resumed_path, &body[..cut]).unwrap();
    let resumed = transfer()
        .fetch_with_report(&resume_server.url("/tasmax.nc"), &resumed_path)
        .await
        .unwrap();

    assert_eq!(
        resumed,
        TransferOutcome::Downloaded {
            bytes: (body.len() - cut) as u64,
            resumed_from: cut as u64
        }
    );
    ranged.assert_async().await;
    assert_eq!(
        std::fs::read(&fresh_path).unwrap(),
        std::fs::read(&resumed_path).unwrap()
    );
    assert_eq!(std::fs::read(&resumed_path).unwrap(), body);
}

#[tokio::test]
async fn test_repeated_fetch_is_idempotent() {
    let body = payload();
    let server = MockServer::start_async().await;
    let head = server
        .mock_async(|when, then| {
            when.method(HEAD).path("/tasmax.nc");
            then.status(200).body(body.clone());
        })
        .await;
    let get = server
        .mock_async(|when, then| {
            when.method(GET).path("/tasmax.nc");
            then.status(200).body(body.clone());
        })
        .await;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tasmax.nc");
    let transfer = transfer();
    transfer.fetch(&server.url("/tasmax.nc"), &path).await.unwrap();
    let second = transfer
        .fetch_with_report(&server.url("/tasmax.nc"), &path)
        .await
        .unwrap();

    assert_eq!(
        second,
        TransferOutcome::AlreadyComplete {
            size: body.len() as u64
        }
    );
    assert_eq!(head.hits_async().await, 2);
    assert_eq!(get.hits_async().await, 1);
}
