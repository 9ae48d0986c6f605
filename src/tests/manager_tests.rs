use super::mock_transport::*;
use crate::connectivity::*;
use std::net::IpAddr;
use std::time::Duration;

fn manager() -> UpnpMappingManager<MockTransport> {
    UpnpMappingManager::new(GatewayClient::new(MockTransport::new()), "portgate")
}

#[tokio::test]
async fn test_manager_start_installs_mapping() {
    let manager = manager();

    let mapping = manager.start(8080, 8080, IpProtocol::TCP).await.unwrap();

    assert_eq!(
        mapping,
        PortMapping::new(8080, 8080, IpProtocol::TCP, "portgate-TCP-8080")
    );
    assert_eq!(manager.mappings()[&IpProtocol::TCP], vec![mapping]);

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_manager_external_address() {
    let manager = manager();

    let addr = manager.external_address().await.unwrap();

    assert_eq!(addr, IpAddr::V4(EXTERNAL_IP));
    assert_eq!(manager.client().stage(), Stage::AddressKnown);
}

#[tokio::test]
async fn test_manager_start_failure_is_reported() {
    let manager = manager();
    manager.client().transport().update(|s| s.discover_fails = true);

    let result = manager.start(8080, 8080, IpProtocol::UDP).await;

    assert_eq!(result, Err(MappingError::NotDiscovered));
    assert!(manager.mappings().is_empty());
}

#[tokio::test]
async fn test_manager_remove() {
    let manager = manager();
    manager.start(5000, 5000, IpProtocol::UDP).await.unwrap();

    assert!(manager.remove(5000, IpProtocol::UDP).await);
    assert!(manager.mappings().is_empty());

    manager.client().transport().update(|s| s.delete_fails = true);
    assert!(!manager.remove(5000, IpProtocol::UDP).await);
}

#[tokio::test]
async fn test_manager_stop_reclaims_everything() {
    let manager = manager();
    manager.start(8080, 8080, IpProtocol::TCP).await.unwrap();
    manager.start(5000, 5000, IpProtocol::UDP).await.unwrap();

    manager.stop().await.unwrap();

    assert!(manager.mappings().is_empty());
    let client = manager.client();
    assert_eq!(
        client
            .transport()
            .count(|c| *c == Call::Delete(8080, IpProtocol::TCP)),
        2
    );
}

#[tokio::test]
async fn test_manager_drop_reclaims_in_background() {
    let manager = manager();
    manager.start(8080, 8080, IpProtocol::TCP).await.unwrap();
    let log = manager.client().transport().call_log();

    drop(manager);

    let reclaimed = || {
        log.lock()
            .unwrap()
            .iter()
            .filter(|c| **c == Call::Delete(8080, IpProtocol::TCP))
            .count()
            == 2
    };
    let mut waited = Duration::ZERO;
    while !reclaimed() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert!(reclaimed());
}

#[tokio::test]
async fn test_manager_drop_keeps_mappings_while_client_is_shared() {
    let manager = manager();
    manager.start(8080, 8080, IpProtocol::TCP).await.unwrap();
    let client = manager.client();
    client.transport().clear_calls();

    drop(manager);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(client.registry().contains(8080, 8080, IpProtocol::TCP));
    assert!(client.transport().calls().is_empty());
}

#[test]
fn test_description_format() {
    let manager = manager();
    assert_eq!(
        manager.description_for(IpProtocol::UDP, 6881),
        "portgate-UDP-6881"
    );
}
