use super::*;

#[tokio::test]
async fn test_remove_in_flight_aborts_and_ignores_later_events() {
    let transport = MockTransport::new(Script::Hold);
    let uploader = create_test_uploader(test_config(), Hooks::new(), &transport);
    let mut events = uploader.subscribe();

    let ids = uploader.add_files(vec![text_file("a.txt")]).await.unwrap();
    transport.wait_opened(1).await;
    let held = transport.held().remove(0);

    uploader.remove(ids[0]).await.unwrap();

    wait_aborted(&held).await;
    wait_for_uploads(&uploader, |u| u.is_empty()).await;
    assert!(uploader.get(ids[0]).await.is_none());

    // the transport keeps talking after the abort; nobody listens
    held.events
        .send(TransportEvent::Complete(UploadResponse::new(200, "late")))
        .await
        .ok();

    let event = next_event(&mut events, |e| {
        matches!(e, Event::Removed { .. } | Event::Completed { .. })
    })
    .await;
    assert!(matches!(event, Event::Removed { id } if id == ids[0]));
    assert!(uploader.uploads().is_empty());
}

#[tokio::test]
async fn test_remove_unknown_upload_is_not_found() {
    let transport = MockTransport::new(Script::Hold);
    let uploader = create_test_uploader(test_config(), Hooks::new(), &transport);

    let err = uploader.remove(crate::types::UploadId(42)).await.unwrap_err();

    assert!(matches!(err, Error::NotFound(id) if id.get() == 42));
}

#[tokio::test]
async fn test_readding_removed_file_creates_new_upload() {
    let transport = MockTransport::new(Script::Hold);
    let uploader = create_test_uploader(test_config(), Hooks::new(), &transport);

    let first = uploader.add_files(vec![text_file("a.txt")]).await.unwrap();
    uploader.remove(first[0]).await.unwrap();
    wait_for_uploads(&uploader, |u| u.is_empty()).await;

    let second = uploader.add_files(vec![text_file("a.txt")]).await.unwrap();

    assert_ne!(first[0], second[0]);
    let uploads = uploader.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].id(), second[0]);
}

#[tokio::test]
async fn test_retry_without_request_options_fails() {
    let transport = MockTransport::new(Script::ok(200, "ok"));
    let uploader = create_test_uploader(Config::default(), Hooks::new(), &transport);
    let mut errors = uploader.errors();

    let ids = uploader.add_files(vec![text_file("a.txt")]).await.unwrap();
    next_error(&mut errors).await;

    let err = uploader.retry(ids[0]).await.unwrap_err();

    assert!(matches!(err, Error::MissingRequestOptions { id } if id == ids[0]));
}

#[tokio::test]
async fn test_set_request_options_then_retry_uploads() {
    let transport = MockTransport::new(Script::ok(201, "created"));
    let uploader = create_test_uploader(Config::default(), Hooks::new(), &transport);
    let mut errors = uploader.errors();

    let ids = uploader.add_files(vec![text_file("a.txt")]).await.unwrap();
    next_error(&mut errors).await;

    uploader
        .set_request_options(ids[0], RequestOptions::with_url(TEST_URL))
        .await
        .unwrap();
    uploader.retry(ids[0]).await.unwrap();

    let uploads = wait_for_uploads(&uploader, |u| {
        u.first().is_some_and(|u| u.succeeded())
    })
    .await;
    assert_eq!(uploads[0].response_code(), Some(201));
    assert_eq!(transport.requests()[0].url, TEST_URL);
}

#[tokio::test]
async fn test_retry_after_transport_failure() {
    let transport = MockTransport::new(Script::ok(200, "ok"));
    transport.script("a.txt", Script::Fail("timeout".to_string()));
    let uploader = create_test_uploader(test_config(), Hooks::new(), &transport);

    let ids = uploader.add_files(vec![text_file("a.txt")]).await.unwrap();
    wait_for_uploads(&uploader, |u| {
        u.first()
            .is_some_and(|u| u.progress.state == UploadState::Failed)
    })
    .await;

    uploader.retry(ids[0]).await.unwrap();

    let uploads = wait_for_uploads(&uploader, |u| u.first().is_some_and(|u| u.succeeded())).await;
    assert_eq!(uploads[0].id(), ids[0]);
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn test_retry_aborts_running_transfer() {
    let transport = MockTransport::new(Script::Hold);
    let uploader = create_test_uploader(test_config(), Hooks::new(), &transport);

    let ids = uploader.add_files(vec![text_file("a.txt")]).await.unwrap();
    transport.wait_opened(1).await;

    uploader.retry(ids[0]).await.unwrap();
    transport.wait_opened(2).await;

    let held = transport.held();
    wait_aborted(&held[0]).await;
    assert!(!held[1].abort.is_cancelled());

    // the first transfer answering late changes nothing
    held[0]
        .events
        .send(TransportEvent::Complete(UploadResponse::new(500, "stale")))
        .await
        .ok();
    held[1]
        .events
        .send(TransportEvent::Complete(UploadResponse::new(200, "fresh")))
        .await
        .unwrap();

    let uploads = wait_for_uploads(&uploader, |u| u.first().is_some_and(|u| u.succeeded())).await;
    assert_eq!(uploads[0].response.as_ref().unwrap().body, "fresh");
}

#[tokio::test]
async fn test_retry_unknown_upload_is_not_found() {
    let transport = MockTransport::new(Script::Hold);
    let uploader = create_test_uploader(test_config(), Hooks::new(), &transport);

    let err = uploader.retry(crate::types::UploadId(7)).await.unwrap_err();

    assert_eq!(err.error_code(), "not_found");
}

#[tokio::test]
async fn test_reset_aborts_and_restores_initial_state() {
    let transport = MockTransport::new(Script::Hold);
    let uploader = create_test_uploader(test_config(), Hooks::new(), &transport);

    let ids = uploader.add_files(vec![text_file("a.txt")]).await.unwrap();
    transport.wait_opened(1).await;
    let held = transport.held().remove(0);
    held.events
        .send(TransportEvent::Progress {
            loaded: 40,
            total: Some(100),
        })
        .await
        .unwrap();
    wait_for_uploads(&uploader, |u| {
        u.first().is_some_and(|u| u.progress.percent > 0.0)
    })
    .await;

    uploader.reset(ids[0]).await.unwrap();

    wait_aborted(&held).await;
    let upload = uploader.get(ids[0]).await.unwrap();
    assert_eq!(upload.progress.state, UploadState::NotStarted);
    assert_eq!(upload.progress.percent, 0.0);
    assert!(!upload.upload_has_started());
    assert_eq!(upload.response, None);
    assert_eq!(uploader.uploads().len(), 1);
}

#[tokio::test]
async fn test_reject_marks_failed_and_reports() {
    let transport = MockTransport::new(Script::ok(200, "ok"));
    let uploader = create_test_uploader(test_config(), Hooks::new(), &transport);
    let mut errors = uploader.errors();

    let ids = uploader.add_files(vec![text_file("a.txt")]).await.unwrap();
    wait_for_uploads(&uploader, |u| u.first().is_some_and(|u| u.succeeded())).await;

    uploader
        .reject(ids[0], Some(UploadResponse::new(422, "virus found")))
        .await
        .unwrap();

    let upload = uploader.get(ids[0]).await.unwrap();
    assert!(upload.failed());
    assert!(upload.rejected);
    assert_eq!(upload.response_code(), Some(422));

    let error = next_error(&mut errors).await;
    assert!(matches!(
        error,
        UploadError::UploadRejected { status_code: Some(422), .. }
    ));
}

#[tokio::test]
async fn test_clear_empties_session_and_detaches_sources() {
    let transport = MockTransport::new(Script::Hold);
    let uploader = create_test_uploader(test_config(), Hooks::new(), &transport);
    let picker = FakePicker::new(true);
    let target = FakeDropTarget::new();
    assert!(uploader.register_picker(picker.clone()).await);
    assert!(uploader.register_drop_target(target.clone()).await);
    let mut events = uploader.subscribe();

    uploader
        .add_files(vec![text_file("a.txt"), text_file("b.txt")])
        .await
        .unwrap();
    transport.wait_opened(2).await;
    target.send(DragEvent::Enter);
    wait_for_drag_over(&uploader, true).await;

    uploader.clear().await;

    assert!(uploader.uploads().is_empty());
    assert!(!uploader.drag_over());
    for held in transport.held() {
        wait_aborted(&held).await;
    }
    assert_eq!(picker.cleared.load(Ordering::SeqCst), 1);
    assert_eq!(target.cleared.load(Ordering::SeqCst), 1);
    next_event(&mut events, |e| matches!(e, Event::Cleared)).await;

    // listeners are gone: a new selection is not picked up
    picker.select(vec![text_file("c.txt")]);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(uploader.uploads().is_empty());

    // and the picker can be registered again
    assert!(uploader.register_picker(picker.clone()).await);
}

#[tokio::test]
async fn test_shutdown_rejects_new_files() {
    let transport = MockTransport::new(Script::Hold);
    let uploader = create_test_uploader(test_config(), Hooks::new(), &transport);
    let mut events = uploader.subscribe();

    uploader.add_files(vec![text_file("a.txt")]).await.unwrap();
    transport.wait_opened(1).await;

    uploader.shutdown().await;

    wait_aborted(&transport.held()[0]).await;
    assert!(uploader.uploads().is_empty());
    next_event(&mut events, |e| matches!(e, Event::Shutdown)).await;

    let err = uploader
        .add_files(vec![text_file("b.txt")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ShuttingDown));
}
