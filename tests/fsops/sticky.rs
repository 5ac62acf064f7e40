use eventfs::fs::STICKY_XATTR;

use super::common::{kill, spawn_sleeper, Fixture};

#[tokio::test]
async fn sticky_directory_survives_its_creator() {
    let fixture = Fixture::new();
    let mut child = spawn_sleeper();

    fixture.fs.mkdir("/q", 0o755, &fixture.cred_of(&child)).await.expect("mkdir");
    fixture.produce("/q/a", b"kept").await;
    fixture.fs.set_xattr("/q", STICKY_XATTR, b"").await.expect("setxattr");

    kill(&mut child);

    assert!(fixture.fs.stat("/q").await.is_ok());
    assert!(fixture.names("/").await.contains(&"q".to_owned()));

    fixture.fs.quiesce().await;
    assert_eq!(fixture.fs.read("/q/a", 0, 16).await.expect("read"), b"kept");
}

#[tokio::test]
async fn sticky_presence_probe_is_a_zero_length_get() {
    let fixture = Fixture::new();
    fixture.mkdir("/q").await;

    fixture.fs.set_xattr("/q", STICKY_XATTR, b"").await.expect("setxattr");
    assert_eq!(fixture.fs.get_xattr("/q", STICKY_XATTR).await.expect("getxattr"), Vec::<u8>::new());
}

#[tokio::test]
async fn unmarked_sibling_is_still_reaped() {
    let fixture = Fixture::new();
    let mut child = spawn_sleeper();
    let child_cred = fixture.cred_of(&child);

    fixture.fs.mkdir("/sticky", 0o755, &child_cred).await.expect("mkdir sticky");
    fixture.fs.mkdir("/doomed", 0o755, &child_cred).await.expect("mkdir doomed");
    fixture.fs.set_xattr("/sticky", STICKY_XATTR, b"").await.expect("setxattr");

    kill(&mut child);
    fixture.names("/").await;
    fixture.fs.quiesce().await;

    assert_eq!(fixture.names("/").await, vec!["sticky".to_owned()]);
}
