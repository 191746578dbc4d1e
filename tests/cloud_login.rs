//! Cloud Login Integration Tests
//!
//! Login, home lookup and handing the resulting local keys to a device client.


use integration_harness::{DEVICE_ID, LOCAL_KEY, ScriptedCloud, spawn_device, vacuum};
use rockwire_client::{ClientConfig, DeviceQueries};
use rockwire_cloud::{AuthError, CloudAuthClient, CloudClientConfig};
use rockwire_crypto::HmacAuthenticator;
use serde_json::{Value, json};
use std::time::Duration;

fn login_data() -> Value {
    json!({
        "uid": 1234567,
        "tokentype": "",
        "token": "rr63d4a3c7a1b2f0:txQ7zyX1WyVgyw==",
        "rruid": "rr63d4a3c7a1b2f0",
        "region": "eu",
        "countrycode": "49",
        "nickname": "user",
        "rriot": {
            "u": "4Fv3Ii1hLUDXCpsEG4SRb9",
            "s": "Rh1GNN",
            "h": "nBHx6XlsH3",
            "k": "2Zc8RhCF",
            "r": {
                "r": "EU",
                "a": "https://api-eu.roborock.com",
                "m": "ssl://mqtt-eu-3.roborock.com:8883",
                "l": "https://wood-eu.roborock.com"
            }
        }
    })
}

fn home_result() -> Value {
    json!({
        "id": 1355397,
        "name": "My Home",
        "products": [{ "id": "6HL2zfniaoYYV01CJiO1UA", "name": "Roborock S7 MaxV", "model": "roborock.vacuum.a27" }],
        "devices": [{
            "duid": DEVICE_ID,
            "name": "Roborock S7 MaxV",
            "localKey": LOCAL_KEY,
            "productId": "6HL2zfniaoYYV01CJiO1UA",
            "fv": "02.56.02",
            "online": true,
            "timeZoneId": "Europe/Berlin"
        }],
        "receivedDevices": []
    })
}

fn cloud_config() -> CloudClientConfig {
    let config = ClientConfig::parse(
        r#"
        [cloud]
        username = "user@example.com"
        installation_id = "installation-0001"
        "#,
    )
    .expect("Failed to parse config");
    config.cloud_client_config().expect("No cloud section")
}

/// Test: Login through to a working device client
#[tokio::test]
async fn test_login_to_device_command() {
    let cloud = ScriptedCloud::new(vec![
        (200, json!({ "code": 200, "msg": "success", "data": { "url": "https://euiot.roborock.com" } })),
        (200, json!({ "code": 200, "msg": "success", "data": login_data() })),
        (200, json!({ "code": 200, "msg": "success", "data": { "rrHomeId": 1355397 } })),
        (200, json!({ "api": null, "success": true, "result": home_result() })),
    ]);
    let client = CloudAuthClient::with_executor(cloud_config(), cloud.clone());

    let user = client.password_login("hunter2").await.expect("Login failed");
    let home = client.get_home_data(&user).await.expect("Home data failed");
    assert_eq!(home.name, "My Home");

    let requests = cloud.requests.lock().clone();
    assert_eq!(requests.len(), 4);
    assert!(requests[1..3]
        .iter()
        .all(|r| r.header_value("header_clientid") == Some("32ICm4faq37SG91vLQFDJQ==")));

    // The regional request carries a verifiable signature
    let auth = requests[3].header_value("Authorization").expect("Not signed");
    let field = |name: &str| -> String {
        let marker = format!(" {name}=\"");
        let start = auth.find(&marker).expect("Missing field") + marker.len();
        let end = start + auth[start..].find('"').expect("Unterminated field");
        auth[start..end].to_string()
    };
    let signer = HmacAuthenticator::new("4Fv3Ii1hLUDXCpsEG4SRb9", "Rh1GNN", "nBHx6XlsH3");
    let expected = signer.sign(
        &field("nonce"),
        field("ts").parse().expect("Bad ts"),
        "/user/homes/1355397",
    );
    assert_eq!(auth, expected.authorization);

    // Seed a device client from the home data
    let mut device = integration_harness::device_config(Duration::from_secs(2), false);
    device.local_keys = home.local_keys();
    let harness = spawn_device(device, vacuum(0, vec![]));

    let status = harness.client.get_status(DEVICE_ID).await.expect("Status failed");
    assert_eq!(status.battery, 100);
}

/// Test: Code login after requesting a verification code
#[tokio::test]
async fn test_code_login_flow() {
    let cloud = ScriptedCloud::new(vec![
        (200, json!({ "code": 200, "data": { "url": "https://euiot.roborock.com" } })),
        (200, json!({ "code": 200, "msg": "success", "data": null })),
        (200, json!({ "code": 200, "data": login_data() })),
    ]);
    let client = CloudAuthClient::with_executor(cloud_config(), cloud.clone());

    client.request_verification_code().await.expect("Code request failed");
    let user = client.code_login("123456").await.expect("Code login failed");
    assert_eq!(user.rriot.reference.api, "https://api-eu.roborock.com");

    let requests = cloud.requests.lock().clone();
    assert_eq!(requests.len(), 3);
    assert!(requests[1].url.ends_with("/api/v1/sendEmailCode"));
    assert!(requests[2].url.ends_with("/api/v1/loginWithCode"));
}

/// Test: Unreachable cloud during region lookup
#[tokio::test]
async fn test_region_lookup_unreachable() {
    let cloud = ScriptedCloud::new(vec![]);
    let client = CloudAuthClient::with_executor(cloud_config(), cloud);

    assert!(matches!(
        client.password_login("hunter2").await,
        Err(AuthError::RegionResolutionFailed(_))
    ));
}

/// Test: Wrong verification code is rejected by the server
#[tokio::test]
async fn test_wrong_code_rejected() {
    let cloud = ScriptedCloud::new(vec![
        (200, json!({ "code": 200, "data": { "url": "https://euiot.roborock.com" } })),
        (200, json!({ "code": 2018, "msg": "verification code is incorrect" })),
    ]);
    let client = CloudAuthClient::with_executor(cloud_config(), cloud);

    assert_eq!(
        client.code_login("000000").await,
        Err(AuthError::ServerRejected("verification code is incorrect".into()))
    );
}
