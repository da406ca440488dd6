//! CLI structure: the mandated command tree parses.

use clap::Parser;
use gitswarm::cli::{Cli, Commands};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).expect("should parse")
}

#[test]
fn test_core_commands_parse() {
    assert!(matches!(parse(&["gitswarm", "init"]).command, Commands::Init { .. }));
    assert!(matches!(
        parse(&["gitswarm", "agent", "register", "alice"]).command,
        Commands::Agent(_)
    ));
    assert!(matches!(
        parse(&["gitswarm", "workspace", "create", "--as", "alice"]).command,
        Commands::Workspace(_)
    ));
    assert!(matches!(
        parse(&["gitswarm", "commit", "-m", "msg", "--as", "alice"]).command,
        Commands::Commit { .. }
    ));
    assert!(matches!(parse(&["gitswarm", "stream", "list"]).command, Commands::Stream(_)));
    assert!(matches!(
        parse(&[
            "gitswarm", "review", "submit", "abcd1234", "--as", "bob", "--verdict", "approve"
        ])
        .command,
        Commands::Review(_)
    ));
    assert!(matches!(
        parse(&["gitswarm", "merge", "abcd1234", "--as", "alice"]).command,
        Commands::Merge { .. }
    ));
    assert!(matches!(
        parse(&["gitswarm", "stabilize", "--as", "alice"]).command,
        Commands::Stabilize { .. }
    ));
    assert!(matches!(
        parse(&["gitswarm", "promote", "--as", "alice"]).command,
        Commands::Promote { .. }
    ));
    assert!(matches!(
        parse(&["gitswarm", "task", "create", "do things", "--as", "alice"]).command,
        Commands::Task(_)
    ));
    assert!(matches!(
        parse(&["gitswarm", "council", "status"]).command,
        Commands::Council(_)
    ));
    assert!(matches!(parse(&["gitswarm", "status"]).command, Commands::Status));
    assert!(matches!(parse(&["gitswarm", "log", "--limit", "5"]).command, Commands::Log { .. }));
    assert!(matches!(
        parse(&["gitswarm", "config", "sync.server_url"]).command,
        Commands::Config { .. }
    ));
}

#[test]
fn test_global_json_flag() {
    let cli = parse(&["gitswarm", "--json", "status"]);
    assert!(cli.json);
    let cli = parse(&["gitswarm", "agent", "list", "--json"]);
    assert!(cli.json);
}

#[test]
fn test_missing_required_args_fail() {
    assert!(Cli::try_parse_from(["gitswarm", "commit", "-m", "msg"]).is_err());
    assert!(Cli::try_parse_from(["gitswarm", "merge"]).is_err());
    assert!(Cli::try_parse_from(["gitswarm", "review", "submit", "s", "--as", "b"]).is_err());
}
