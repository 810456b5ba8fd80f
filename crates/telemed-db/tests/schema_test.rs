//! Integration tests for schema initialization using in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

#[tokio::test]
async fn schema_migration_applies_successfully() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    telemed_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("INFO FOR DB").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let info = info.expect("INFO FOR DB should return a value");
    let info_str = format!("{:?}", info);

    for table in [
        "telemedicine_session",
        "telemedicine_consent",
        "identity_verification",
        "telemedicine_recording",
        "first_encounter_exception",
        "schema_version",
    ] {
        assert!(info_str.contains(table), "missing {table} table");
    }
}

#[tokio::test]
async fn schema_migration_is_idempotent() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    telemed_db::run_migrations(&db).await.unwrap();
    telemed_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("SELECT * FROM schema_version").await.unwrap();
    let records: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    assert_eq!(records.len(), 1, "expected exactly one schema_version row");
}

#[tokio::test]
async fn session_status_assert_rejects_unknown_values() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    telemed_db::run_migrations(&db).await.unwrap();

    let result = db
        .query(
            "CREATE telemedicine_session SET \
             tenant_id = 't', appointment_id = 'a', clinic_id = 'c', \
             provider_id = 'p', patient_id = 'q', room_name = 'r', \
             room_url = 'https://video.test/r', room_expires_at = time::now(), \
             status = 'paused', active_slot = 'a', version = 0, \
             created_at = time::now(), updated_at = time::now()",
        )
        .await
        .unwrap()
        .check();
    assert!(result.is_err(), "unknown status should be rejected");
}

#[tokio::test]
async fn active_slot_index_rejects_second_live_session() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    telemed_db::run_migrations(&db).await.unwrap();

    let insert = "CREATE telemedicine_session SET \
         tenant_id = 't', appointment_id = 'a', clinic_id = 'c', \
         provider_id = 'p', patient_id = 'q', room_name = 'r', \
         room_url = 'https://video.test/r', room_expires_at = time::now(), \
         status = 'Scheduled', active_slot = 'a', version = 0, \
         created_at = time::now(), updated_at = time::now()";

    db.query(insert).await.unwrap().check().unwrap();
    let duplicate = db.query(insert).await.unwrap().check();
    assert!(duplicate.is_err(), "second live session should be rejected");
}
