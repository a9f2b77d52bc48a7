use env_logger::Builder;
use log::{info, LevelFilter};
use std::sync::Arc;

use txdb::{Database, DatabaseConfig, DbFile, Permission};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    Builder::new().filter_level(LevelFilter::Info).init();

    info!("txdb: transactional page store demo");

    let db_path = std::env::temp_dir().join(format!("txdb-demo-{}", uuid::Uuid::new_v4()));
    let db = Database::open(&db_path, DatabaseConfig::default())?;

    let heap = db.open_heap_file("demo")?;
    let page_no = heap.allocate_page()?;
    let file: Arc<dyn DbFile> = heap;
    let pool = db.buffer_pool();

    let writer = pool.start_transaction()?;
    let page = pool.get_page(&file, page_no, writer, Permission::Write)?;
    page.write(writer, |data| data[..5].copy_from_slice(b"hello"));
    pool.commit_transaction(writer)?;
    info!("committed {}", writer);

    let loser = pool.start_transaction()?;
    let page = pool.get_page(&file, page_no, loser, Permission::Write)?;
    page.write(loser, |data| data[..5].copy_from_slice(b"oops!"));
    pool.abort_transaction(loser)?;
    info!("aborted {}", loser);

    let on_disk = file.read_page(page_no)?;
    info!(
        "page {} on disk starts with {:?}",
        page_no,
        on_disk.read(|data| String::from_utf8_lossy(&data[..5]).into_owned())
    );

    db.close()?;
    std::fs::remove_dir_all(&db_path)?;
    Ok(())
}
