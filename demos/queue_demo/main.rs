//! Drives a freshly built engine end to end: one producer fills a
//! queue, then a consumer drains it strictly oldest-first by
//! unlinking `head`.

use std::path::PathBuf;

use eventfs::config::Config;
use eventfs::quota::QuotaTable;
use eventfs::{Credentials, EventFs};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let config = Config {
        default_max_dirs: 64,
        default_max_files: 1024,
        default_max_files_per_dir: 256,
        default_max_bytes: 1 << 20,
        quotas_dir: PathBuf::new(),
    };
    let fs = EventFs::new(config, QuotaTable::new(), QuotaTable::new());
    fs.start();

    let cred = Credentials::current();
    fs.mkdir("/jobs", 0o755, &cred).await.expect("mkdir /jobs");

    for (name, payload) in [("a", "first"), ("b", "second"), ("c", "third")] {
        let path = format!("/jobs/{name}");
        fs.create(&path, 0o644, &cred).await.expect("create event");
        fs.write(&path, 0, payload.as_bytes()).await.expect("write event");
        println!("produced {path} = {payload:?}");
    }

    println!(
        "queue: head -> {}, tail -> {}",
        fs.readlink("/jobs/head").await.expect("readlink head"),
        fs.readlink("/jobs/tail").await.expect("readlink tail"),
    );

    while let Ok(oldest) = fs.readlink("/jobs/head").await {
        let payload = fs.read(&format!("/jobs/{oldest}"), 0, 4096).await.expect("read event");
        println!("consumed {oldest} = {:?}", String::from_utf8_lossy(&payload));
        fs.unlink("/jobs/head").await.expect("unlink head");
    }

    fs.rmdir("/jobs").await.expect("rmdir /jobs");
    fs.quiesce().await;
    fs.stop();
    println!("queue drained");
}
