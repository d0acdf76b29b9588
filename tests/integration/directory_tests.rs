use crate::common::{started, test_config};
use corpus_tally::dispatcher::JobKind;
use corpus_tally::shell::{execute, parse_line, Outcome};
use corpus_tally::TallyError;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

async fn wait_for_file_corpus(
    app: &corpus_tally::App,
    corpus: &str,
) -> corpus_tally::Counts {
    // the corpus only exists once the file crawler picked up its directory job
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        match app.get_summary(JobKind::File, corpus).await {
            Ok(counts) => return counts,
            Err(TallyError::NotFound { .. }) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(e) => panic!("corpus {} never completed: {}", corpus, e),
        }
    }
}

#[tokio::test]
async fn test_directory_corpus_flows_to_summary() {
    let temp = TempDir::new().unwrap();
    let corpus = temp.path().join("corpus_books");
    fs::create_dir_all(corpus.join("vol2")).unwrap();
    fs::write(corpus.join("one.txt"), "alpha beta alpha\n").unwrap();
    fs::write(corpus.join("two.txt"), "beta gamma beta\n").unwrap();
    fs::write(corpus.join("vol2").join("three.txt"), "alpha Alpha alpha.\n").unwrap();
    fs::create_dir(temp.path().join("notes")).unwrap();
    fs::write(temp.path().join("notes").join("skip.txt"), "alpha alpha").unwrap();

    let app = started(test_config(&["alpha", "beta"], 0)).await;
    app.add_directory(temp.path()).await.unwrap();

    let counts = wait_for_file_corpus(&app, "corpus_books").await;
    assert_eq!(counts["alpha"], 3);
    assert_eq!(counts["beta"], 3);
    assert!(!counts.contains_key("gamma"));

    let all = app.get_summaries(JobKind::File).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all["corpus_books"], counts);

    app.stop().await;
}

#[tokio::test]
async fn test_shell_commands_drive_the_app() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("corpus_a")).unwrap();
    fs::write(temp.path().join("corpus_a").join("a.txt"), "alpha").unwrap();

    let mut config = test_config(&["alpha"], 0);
    config.directory.sleep_time = 60_000;
    let app = started(config).await;

    let add = parse_line(&format!("ad {}", temp.path().display()))
        .unwrap()
        .unwrap();
    assert!(matches!(
        execute(&app, add).await.unwrap(),
        Outcome::Continue(_)
    ));

    wait_for_file_corpus(&app, "corpus_a").await;
    let query = parse_line("query file corpus_a").unwrap().unwrap();
    assert_eq!(
        execute(&app, query).await.unwrap(),
        Outcome::Continue("corpus_a: {alpha: 1}".to_string())
    );

    let clear = parse_line("cfs").unwrap().unwrap();
    execute(&app, clear).await.unwrap();
    let query = parse_line("query file corpus_a").unwrap().unwrap();
    assert!(matches!(
        execute(&app, query).await,
        Err(TallyError::NotFound { .. })
    ));

    let bad = parse_line("ad /definitely/not/here").unwrap().unwrap();
    assert!(matches!(
        execute(&app, bad).await,
        Err(TallyError::InvalidInput(_))
    ));

    let stop = parse_line("exit").unwrap().unwrap();
    assert_eq!(execute(&app, stop).await.unwrap(), Outcome::Exit);

    app.stop().await;
}
