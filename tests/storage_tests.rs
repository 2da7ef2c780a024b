/// Integration tests for the storage engine on a file-backed database
use chrono::{DateTime, Utc};
use logvault::ingest::syslog::parse_line;
use logvault::logs::filter::parse_filter;
use logvault::logs::{Cursor, LogDb, PageRequest, SearchRequest};

const LINES: [&str; 3] = [
    r#"<14>1 2024-08-09T01:01:11.364983+00:00 demo.demo.blog 509e69f4-101f-4175-82cb-c2de2b7291f8 [RTR/0] - [tags@47450 app_name="blog" source_type="RTR"] blog.apps.example.com - "POST /api/counter HTTP/2.0" 200"#,
    r#"<14>1 2024-08-09T01:01:11.363164+00:00 demo.demo.blog 509e69f4-101f-4175-82cb-c2de2b7291f8 [APP/PROC/WEB/0] - [tags@47450 app_name="blog" source_type="APP/PROC/WEB"] {"message":"kind=server method=POST status=200","traceId":"f57d0fbed79e4462702e941edbc834c3","spanId":"ee86cd0a3e621624"}"#,
    r#"<11>1 2024-08-09T01:02:00+00:00 demo.demo.blog 509e69f4-101f-4175-82cb-c2de2b7291f8 [APP/PROC/WEB/0] - [tags@47450 app_name="blog" source_type="APP/PROC/WEB"] Connection refused"#,
];

fn received_at() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-08-09T02:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

async fn open_seeded(path: &std::path::Path) -> LogDb {
    let db = LogDb::open(path, 2).await.unwrap();
    let logs: Vec<_> = LINES
        .iter()
        .map(|line| parse_line(line, received_at()).unwrap())
        .collect();
    db.add_all(&logs).await.unwrap();
    db
}

fn filtered(filter: &str) -> SearchRequest {
    SearchRequest {
        filter: Some(parse_filter(filter).unwrap()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_logs_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("logvault.db");

    let db = open_seeded(&path).await;
    db.close().await;

    let db = LogDb::open(&path, 2).await.unwrap();
    let stats = db.stats().await.unwrap();
    assert_eq!(stats.log_count, 3);
    // RTR and APP/PROC/WEB resource attribute sets
    assert_eq!(stats.resource_attributes_count, 2);

    let logs = db.find_latest_logs(&SearchRequest::default()).await.unwrap();
    assert_eq!(logs[0].body, "Connection refused");
    assert_eq!(logs[0].severity_text.as_deref(), Some("ERROR"));
    assert!(logs.iter().all(|log| log.log_id.is_some()));
}

#[tokio::test]
async fn test_filter_on_resource_attributes_and_trace() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_seeded(&dir.path().join("logvault.db")).await;

    let rtr = db
        .count(&filtered("resourceAttributes['source_type'] == 'RTR'"))
        .await
        .unwrap();
    assert_eq!(rtr, 1);

    let traced = db
        .find_latest_logs(&filtered("traceId == 'f57d0fbed79e4462702e941edbc834c3'"))
        .await
        .unwrap();
    assert_eq!(traced.len(), 1);
    assert_eq!(traced[0].span_id.as_deref(), Some("ee86cd0a3e621624"));

    let errors = db
        .count(&SearchRequest {
            query: Some("refused".to_string()),
            filter: Some(parse_filter("severityText == 'ERROR'").unwrap()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(errors, 1);
}

#[tokio::test]
async fn test_paging_with_cursor_of_last_record() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_seeded(&dir.path().join("logvault.db")).await;

    let mut request = SearchRequest {
        page_request: Some(PageRequest {
            cursor: None,
            size: 1,
        }),
        ..Default::default()
    };

    let mut bodies = Vec::new();
    loop {
        let page = db.find_latest_logs(&request).await.unwrap();
        let Some(last) = page.last() else { break };
        request.page_request = Some(PageRequest {
            cursor: Some(Cursor::of(last)),
            size: 1,
        });
        bodies.extend(page.iter().map(|log| log.body.clone()));
    }

    assert_eq!(bodies.len(), 3);
    assert_eq!(bodies[0], "Connection refused");
    assert!(bodies[2].starts_with("{\"message\""));
}

#[tokio::test]
async fn test_delete_then_vacuum() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_seeded(&dir.path().join("logvault.db")).await;

    let deleted = db
        .delete(&filtered("resourceAttributes['source_type'] == 'RTR'"))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    db.vacuum().await.unwrap();

    let stats = db.stats().await.unwrap();
    assert_eq!(stats.log_count, 2);
    assert_eq!(stats.resource_attributes_count, 1);
}
