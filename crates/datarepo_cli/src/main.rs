//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open the configured database and seed the member fixture.
//! - Print a paging demo so core wiring can be checked by eye.
//!
//! Usage: `datarepo_cli [settings.json]`

use datarepo_core::{
    open_db_with, CrudRepository, Direction, Member, MemberRepository, Session, Settings, Sort,
    Team, TeamRepository,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("datarepo_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    }
    .with_env_overrides();

    if datarepo_core::init_logging_from(&settings.logging)? {
        log::info!("event=cli_start module=cli status=ok");
    }

    println!("datarepo_core ping={}", datarepo_core::ping());
    println!("datarepo_core version={}", datarepo_core::core_version());

    let conn = open_db_with(&settings.database)?;
    let session = Session::new(&conn);
    let teams = TeamRepository::new(&session);
    let members = MemberRepository::try_new(&session)?;

    if members.count()? == 0 {
        let mut team_a = Team::new("teamA");
        let mut team_b = Team::new("teamB");
        teams.save(&mut team_a)?;
        teams.save(&mut team_b)?;
        for (index, age) in [10, 19, 20, 21, 40].into_iter().enumerate() {
            let team = if index % 2 == 0 { &team_a } else { &team_b };
            let mut member = Member::with_team(format!("member{}", index + 1), age, team);
            members.save(&mut member)?;
        }
    }

    let request = settings
        .paging
        .page_request(None, Some(3), Sort::by(Direction::Desc, &["username"]))?;
    let page = members.find_by_age_query(10, &request)?;
    println!(
        "find_by_age_query(10): page={} elements={} total={}",
        page.number(),
        page.number_of_elements(),
        page.total_elements()
    );

    let all = members.find_all_paged(&request)?;
    println!(
        "members: page={}/{} total={} has_next={}",
        all.number() + 1,
        all.total_pages(),
        all.total_elements(),
        all.has_next()
    );
    for member in members.find_all()? {
        println!(
            "  {} age={} team={}",
            member.username,
            member.age,
            member.team().map_or("-", |team| team.name.as_str())
        );
    }
    println!("statements={}", session.statement_count());
    Ok(())
}
