//! CLI 모듈
//!
//! osint-ingest CLI 명령어 정의 및 구현

use anyhow::{bail, Context, Result};
use chrono::Datelike;
use clap::{Parser, Subcommand};

use crate::config::{has_api_key, Settings};
use crate::discovery::{build_search_request, is_fallback, DuckDuckGoSearch, SourceDiscovery};
use crate::extractor::{top_entities, ExtractedRecord};
use crate::ingest::{IngestStats, Ingestor};
use crate::storage::{store_record, RecordStore};
use crate::summarize::{is_error_text, GeminiSummarizer, Summarizer};
use crate::validator::HttpValidator;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "osint-ingest")]
#[command(version, about = "OSINT 소스 탐색 및 본문 수집 파이프라인", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 프롬프트로 수집 대상 URL 탐색
    Discover {
        /// 조사 주제
        prompt: String,
    },

    /// 지정한 URL 수집
    Ingest {
        /// 수집할 URL (여러 번 지정 가능)
        #[arg(short, long, required = true)]
        url: Vec<String>,

        /// 관련도 키워드 (지정 시 관련도 게이트 활성화)
        #[arg(short, long)]
        keyword: Vec<String>,

        /// 최소 관련도 점수 (0.0 ~ 1.0)
        #[arg(long, default_value = "0.3")]
        min_relevance: f64,

        /// 결과를 저장소에 기록
        #[arg(long)]
        save: bool,
    },

    /// 탐색 → 수집 → (선택) 요약
    Research {
        /// 조사 주제
        prompt: String,

        /// Gemini로 레코드 요약 및 종합 보고서 생성
        #[arg(long)]
        summarize: bool,

        /// 결과를 저장소에 기록
        #[arg(long)]
        save: bool,

        /// 출력할 상위 엔티티 수
        #[arg(long, default_value = "10")]
        entities: usize,
    },

    /// 저장된 레코드 목록
    List {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env();

    match cli.command {
        Commands::Discover { prompt } => cmd_discover(&settings, &prompt).await,
        Commands::Ingest {
            url,
            keyword,
            min_relevance,
            save,
        } => cmd_ingest(&settings, url, keyword, min_relevance, save).await,
        Commands::Research {
            prompt,
            summarize,
            save,
            entities,
        } => cmd_research(&settings, &prompt, summarize, save, entities).await,
        Commands::List { limit } => cmd_list(&settings, limit).await,
        Commands::Status => cmd_status(&settings).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn build_discovery(settings: &Settings) -> Result<SourceDiscovery> {
    let search = DuckDuckGoSearch::new(settings.validator.timeout * 3)
        .context("검색 백엔드 생성 실패")?;
    let validator =
        HttpValidator::new(settings.validator.clone()).context("URL 검증기 생성 실패")?;

    Ok(SourceDiscovery::new(
        Box::new(search),
        Box::new(validator),
        settings.discovery.clone(),
    ))
}

/// 탐색 실행 후 계획 출력
async fn discover_plan(settings: &Settings, prompt: &str) -> Result<Vec<String>> {
    let request = build_search_request(
        prompt,
        settings.discovery.raw_results,
        chrono::Utc::now().year(),
    );
    println!("[*] 검색어: \"{}\"", request.query);
    if let Some(recency) = request.recency {
        println!("    최신성 필터: {:?}", recency);
    }

    let discovery = build_discovery(settings)?;
    let urls = discovery.discover(prompt).await;

    if is_fallback(&urls) {
        println!("[!] 유효한 소스가 부족하여 기본 목록을 사용합니다.");
    } else {
        println!("[OK] 검증된 소스 {} 건", urls.len());
    }
    for (i, url) in urls.iter().enumerate() {
        println!("  {:>2}. {}", i + 1, url);
    }
    println!();

    Ok(urls)
}

/// 탐색 명령어 (discover)
async fn cmd_discover(settings: &Settings, prompt: &str) -> Result<()> {
    discover_plan(settings, prompt).await?;
    Ok(())
}

/// 수집 명령어 (ingest)
async fn cmd_ingest(
    settings: &Settings,
    urls: Vec<String>,
    keywords: Vec<String>,
    min_relevance: f64,
    save: bool,
) -> Result<()> {
    let mut ingestor = Ingestor::from_settings(settings).context("Ingestor 생성 실패")?;
    if !keywords.is_empty() {
        ingestor = ingestor.with_relevance(keywords, min_relevance);
    }

    println!("[*] {} 개 URL 수집 중...", urls.len());
    let (records, stats) = ingestor.ingest_with_stats(&urls).await;

    print_report(&records, &stats);

    if save {
        save_records(settings, &records, &[])?;
    }

    Ok(())
}

/// 조사 명령어 (research)
async fn cmd_research(
    settings: &Settings,
    prompt: &str,
    summarize: bool,
    save: bool,
    entity_count: usize,
) -> Result<()> {
    // 요약 옵션은 API 키가 있어야 의미가 있음 (수집 전에 확인)
    let summarizer = if summarize {
        if !has_api_key() {
            bail!(
                "API 키가 설정되지 않았습니다.\n\n\
                 설정 방법:\n  \
                 export GEMINI_API_KEY=your-api-key\n  \
                 또는\n  \
                 export GOOGLE_AI_API_KEY=your-api-key\n\n\
                 API 키 발급: https://aistudio.google.com/app/apikey"
            );
        }
        Some(GeminiSummarizer::from_env().context("요약기 생성 실패")?)
    } else {
        None
    };

    let urls = discover_plan(settings, prompt).await?;

    let mut ingestor = Ingestor::from_settings(settings).context("Ingestor 생성 실패")?;
    println!("[*] {} 개 URL 수집 중...", urls.len());
    let (records, stats) = ingestor.ingest_with_stats(&urls).await;
    print_report(&records, &stats);

    let successes: Vec<&ExtractedRecord> = records.iter().filter(|r| r.is_success()).collect();
    if successes.is_empty() {
        println!("[!] 분석할 레코드가 없습니다.");
        return Ok(());
    }

    // 엔티티 힌트
    let top = top_entities(successes.iter().map(|r| r.content.as_str()), entity_count);
    if !top.is_empty() {
        println!("[OK] 주요 엔티티:");
        for (entity, count) in &top {
            println!("  [{}] {} ({})", entity.kind.label(), entity.value, count);
        }
        println!();
    }

    // 요약
    let mut summaries = Vec::new();
    if let Some(ref summarizer) = summarizer {
        for (i, record) in successes.iter().enumerate() {
            println!(
                "[{}/{}] 요약 중: {}",
                i + 1,
                successes.len(),
                truncate_text(&record.title, 60)
            );
            let summary = summarizer.summarize(&record.content).await;
            if is_error_text(&summary) {
                println!("    [!] {}", truncate_text(&summary, 120));
            } else {
                println!("    {}", truncate_text(&summary, 300));
            }
            summaries.push(summary);
        }

        println!();
        println!("[*] 종합 보고서 생성 중...");
        let report = summarizer.synthesize(&summaries, prompt).await;
        println!();
        println!("{}", report);
        println!();
    }

    if save {
        save_records(settings, &records, &summaries)?;
    }

    Ok(())
}

/// 목록 명령어 (list)
async fn cmd_list(settings: &Settings, limit: usize) -> Result<()> {
    let store = RecordStore::open(&settings.db_path()).context("RecordStore 열기 실패")?;

    let records = store.list_records(limit).context("레코드 목록 조회 실패")?;

    if records.is_empty() {
        println!("[!] 저장된 레코드가 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 레코드 ({} 건):\n", records.len());

    for record in records {
        let title_display = record
            .title
            .as_ref()
            .map(|t| truncate_text(t, 60))
            .unwrap_or_else(|| "-".to_string());

        println!("  {}", title_display);
        println!("        URL: {}", record.url);
        println!(
            "        {} | {} chars | {}",
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.content.chars().count(),
            record.publish_date.as_deref().unwrap_or("-")
        );
        println!();
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(settings: &Settings) -> Result<()> {
    println!("osint-ingest v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", settings.data_dir.display());
    println!(
        "[*] 탐색 목표/최소: {}/{} | 수집 타임아웃: {:?}",
        settings.discovery.target_validated,
        settings.discovery.min_validated,
        settings.fetch.timeout
    );

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정 (요약 기능 비활성)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match RecordStore::open(&settings.db_path()) {
        Ok(store) => match store.stats() {
            Ok(stats) => {
                println!("[OK] 저장된 레코드: {} 건", stats.record_count);
                println!(
                    "     총 콘텐츠: {}",
                    format_bytes(stats.total_content_bytes)
                );
            }
            Err(e) => {
                println!("[!] 통계 조회 실패: {}", e);
            }
        },
        Err(e) => {
            println!("[!] RecordStore 열기 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 부분 성공 보고 출력
fn print_report(records: &[ExtractedRecord], stats: &IngestStats) {
    println!();
    println!(
        "[OK] 수집 완료: 성공 {} / 시도 {}",
        stats.succeeded, stats.attempted
    );

    let dropped = stats.dropped_quality + stats.dropped_duplicate + stats.dropped_irrelevant;
    if dropped > 0 {
        println!(
            "     제외: 품질 미달 {}, 중복 {}, 관련도 미달 {}",
            stats.dropped_quality, stats.dropped_duplicate, stats.dropped_irrelevant
        );
    }

    for record in records.iter().filter(|r| r.is_success()) {
        println!(
            "  [OK] {} ({} chars)",
            truncate_text(&record.title, 60),
            record.content.chars().count()
        );
        println!("       {}", record.url);
    }

    for line in failure_lines(records) {
        println!("  [!] {}", line);
    }
    println!();
}

/// 실패 레코드별 사유
fn failure_lines(records: &[ExtractedRecord]) -> Vec<String> {
    records
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| {
            format!(
                "{}: {}",
                r.url,
                r.error.as_deref().unwrap_or("unknown error")
            )
        })
        .collect()
}

/// 성공 레코드 저장 (summaries는 성공 레코드 순서와 대응)
fn save_records(
    settings: &Settings,
    records: &[ExtractedRecord],
    summaries: &[String],
) -> Result<()> {
    let store = RecordStore::open(&settings.db_path()).context("RecordStore 열기 실패")?;

    let mut saved = 0;
    let successes = records.iter().filter(|r| r.is_success());
    for (i, record) in successes.enumerate() {
        let summary = summaries
            .get(i)
            .map(String::as_str)
            .filter(|s| !is_error_text(s));
        if store_record(&store, record, summary) {
            saved += 1;
        }
    }

    println!(
        "[OK] {} 건 저장됨 ({})",
        saved,
        store.db_path().display()
    );
    Ok(())
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchError;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_truncate_unicode() {
        assert_eq!(truncate_text("안녕하세요 세계", 5), "안녕하세요...");
    }

    #[test]
    fn test_failure_lines_carry_reason() {
        let records = vec![
            ExtractedRecord::from_fetch_error("http://b", &FetchError::Http(404)),
            ExtractedRecord::from_fetch_error("http://c", &FetchError::Timeout),
        ];

        let lines = failure_lines(&records);
        assert_eq!(lines, vec!["http://b: HTTP 404", "http://c: request timed out"]);
    }

    #[test]
    fn test_cli_parses_ingest_urls() {
        let cli = Cli::try_parse_from([
            "osint-ingest",
            "ingest",
            "--url",
            "https://a.test",
            "-u",
            "https://b.test",
            "-k",
            "strike",
        ])
        .unwrap();

        match cli.command {
            Commands::Ingest {
                url,
                keyword,
                min_relevance,
                save,
            } => {
                assert_eq!(url.len(), 2);
                assert_eq!(keyword, vec!["strike".to_string()]);
                assert!((min_relevance - 0.3).abs() < f64::EPSILON);
                assert!(!save);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_cli_ingest_requires_url() {
        assert!(Cli::try_parse_from(["osint-ingest", "ingest"]).is_err());
    }
}
