//! Interactive course, unit and resource-kind selection
//!
//! The flow is a small state machine: [`Stage::SelectingCourse`] →
//! [`Stage::SelectingUnits`] → [`Stage::SelectingKinds`] →
//! [`Stage::Confirmed`]. Every prompt goes through a [`ChoiceSource`], so the
//! same menus run against the terminal or a scripted list of answers, and any
//! answer supplied up front in [`Presets`] skips its prompt.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::ops::RangeInclusive;

use colored::Colorize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Course, ResourceKind, Unit};
use crate::portal::{AcademicYear, Portal};

/// Courses shown per menu page
pub const PAGE_SIZE: usize = 20;

/// Where menu answers come from
pub trait ChoiceSource {
    /// Show `prompt` and read one answer; `None` once input is exhausted
    fn ask(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Answers typed on stdin
#[derive(Debug, Default)]
pub struct Terminal;

impl ChoiceSource for Terminal {
    fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        let mut stdout = io::stdout();
        write!(stdout, "{}", prompt.cyan())?;
        stdout.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

/// Pre-recorded answers, consumed in order
#[derive(Debug, Default)]
pub struct Scripted {
    answers: VecDeque<String>,
    /// Every prompt that was shown
    pub prompts: Vec<String>,
}

impl Scripted {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }
}

impl ChoiceSource for Scripted {
    fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.answers.pop_front())
    }
}

/// Answers given on the command line
#[derive(Debug, Clone, Default)]
pub struct Presets {
    /// Batch such as `UE23` or `2023`, or `all`
    pub year: Option<String>,
    /// Subject code or 1-based position in the filtered catalog
    pub course: Option<String>,
    pub units: Option<String>,
    pub kinds: Option<String>,
}

/// The user's confirmed choices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub course: Course,
    pub units: Vec<Unit>,
    pub kinds: Vec<ResourceKind>,
}

/// Position in the selection flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    SelectingCourse,
    SelectingUnits(Course),
    SelectingKinds(Course, Vec<Unit>),
    Confirmed(Selection),
    Cancelled,
}

/// Drive the selection flow to completion
///
/// Returns `Ok(None)` when the user quits or input runs out. Presets that do
/// not parse are errors rather than prompts, since nobody is there to answer.
pub fn run_selection(
    portal: &mut dyn Portal,
    courses: &[Course],
    choices: &mut dyn ChoiceSource,
    presets: &Presets,
) -> Result<Option<Selection>> {
    let mut stage = Stage::SelectingCourse;
    loop {
        debug!(?stage, "selection");
        stage = match stage {
            Stage::SelectingCourse => select_course(courses, choices, presets)?,
            Stage::SelectingUnits(course) => select_units(portal, course, choices, presets)?,
            Stage::SelectingKinds(course, units) => select_kinds(course, units, choices, presets)?,
            Stage::Confirmed(selection) => return Ok(Some(selection)),
            Stage::Cancelled => return Ok(None),
        };
    }
}

fn select_course(
    courses: &[Course],
    choices: &mut dyn ChoiceSource,
    presets: &Presets,
) -> Result<Stage> {
    let course = match presets.course.as_deref() {
        Some(wanted) => Some(find_course(courses, wanted).ok_or_else(|| {
            Error::InvalidSelection(format!("no course matches '{}'", wanted))
        })?),
        None => choose_course(courses, choices)?,
    };

    Ok(match course {
        Some(course) => {
            println!("{} {} - {}", "Selected:".green(), course.code, course.name);
            Stage::SelectingUnits(course)
        }
        None => Stage::Cancelled,
    })
}

fn select_units(
    portal: &mut dyn Portal,
    course: Course,
    choices: &mut dyn ChoiceSource,
    presets: &Presets,
) -> Result<Stage> {
    let units = portal.list_units(&course)?;
    if units.is_empty() {
        println!("{}", "This course has no units.".yellow());
        return Ok(Stage::Cancelled);
    }

    println!("\n{}", "Available units:".cyan());
    for unit in &units {
        println!("  {}. {}", unit.number, unit.name);
    }

    let picked = match presets.units.as_deref() {
        Some(preset) => parse_unit_selection(preset, units.len())?,
        None => {
            let answer = ask_until_valid(choices, "Units (e.g. 1,2 or 1-3 or all): ", |input| {
                parse_unit_selection(input, units.len())
            })?;
            match answer {
                Some(picked) => picked,
                None => return Ok(Stage::Cancelled),
            }
        }
    };

    let chosen: Vec<Unit> = picked.iter().map(|&n| units[n - 1].clone()).collect();
    let numbers: Vec<String> = picked.iter().map(|n| n.to_string()).collect();
    println!("{} {}", "Units:".green(), numbers.join(", "));
    Ok(Stage::SelectingKinds(course, chosen))
}

fn select_kinds(
    course: Course,
    units: Vec<Unit>,
    choices: &mut dyn ChoiceSource,
    presets: &Presets,
) -> Result<Stage> {
    println!("\n{}", "Resource types:".cyan());
    for kind in ResourceKind::ALL {
        println!("  {}. {}", kind.portal_id(), kind);
    }

    let kinds = match presets.kinds.as_deref() {
        Some(preset) => parse_kind_selection(preset)?,
        None => match ask_until_valid(
            choices,
            "Resource types (e.g. 2,3,6 or all): ",
            parse_kind_selection,
        )? {
            Some(kinds) => kinds,
            None => return Ok(Stage::Cancelled),
        },
    };

    let labels: Vec<&str> = kinds.iter().map(|k| k.label()).collect();
    println!("{} {}", "Resources:".green(), labels.join(", "));
    Ok(Stage::Confirmed(Selection {
        course,
        units,
        kinds,
    }))
}

fn ask_until_valid<T>(
    choices: &mut dyn ChoiceSource,
    prompt: &str,
    parse: impl Fn(&str) -> Result<T>,
) -> Result<Option<T>> {
    loop {
        let Some(answer) = choices.ask(prompt)? else {
            return Ok(None);
        };
        match parse(&answer) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => println!("{}", e.to_string().red()),
        }
    }
}

/// Pick the academic batches to list
///
/// Menu answers `1`-`6` pick one batch newest first, `7` picks all of them and
/// an empty or unknown answer falls back to UE23.
pub fn choose_years(
    choices: &mut dyn ChoiceSource,
    presets: &Presets,
) -> Result<Vec<AcademicYear>> {
    if let Some(preset) = presets.year.as_deref() {
        if preset.trim().eq_ignore_ascii_case("all") {
            return Ok(AcademicYear::KNOWN.to_vec());
        }
        return AcademicYear::parse(preset)
            .map(|year| vec![year])
            .ok_or_else(|| Error::InvalidSelection(format!("unknown academic year '{}'", preset)));
    }

    println!("\n{}", "Select academic year:".cyan());
    for (i, year) in AcademicYear::KNOWN.iter().enumerate() {
        println!("  {}. {} ({})", i + 1, year.prefix(), year.label());
    }
    println!("  {}. All years", AcademicYear::KNOWN.len() + 1);

    let answer = choices
        .ask("Enter choice (1-7, default=3): ")?
        .unwrap_or_default();
    Ok(parse_year_choice(&answer))
}

/// Interpret an answer to the year menu
pub fn parse_year_choice(input: &str) -> Vec<AcademicYear> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("all") {
        return AcademicYear::KNOWN.to_vec();
    }
    match input.parse::<usize>() {
        Ok(n) if (1..=AcademicYear::KNOWN.len()).contains(&n) => vec![AcademicYear::KNOWN[n - 1]],
        Ok(n) if n == AcademicYear::KNOWN.len() + 1 => AcademicYear::KNOWN.to_vec(),
        _ => vec![AcademicYear::parse(input).unwrap_or(AcademicYear::DEFAULT)],
    }
}

/// Find a course by 1-based position or by subject code (case-insensitive)
pub fn find_course(courses: &[Course], input: &str) -> Option<Course> {
    let input = input.trim();
    if let Ok(n) = input.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| courses.get(i)).cloned();
    }
    courses
        .iter()
        .find(|course| course.code.eq_ignore_ascii_case(input))
        .cloned()
}

/// Courses whose code or name contains `term`, ignoring case
pub fn search_courses(courses: &[Course], term: &str) -> Vec<Course> {
    let term = term.trim().to_lowercase();
    courses
        .iter()
        .filter(|course| {
            course.code.to_lowercase().contains(&term) || course.name.to_lowercase().contains(&term)
        })
        .cloned()
        .collect()
}

/// Paged course menu with search
///
/// `n`/`p` page, `s` searches within the current listing, `q` quits; any
/// other answer is a course number or subject code.
pub fn choose_course(courses: &[Course], choices: &mut dyn ChoiceSource) -> Result<Option<Course>> {
    if courses.is_empty() {
        println!("{}", "No courses available.".red());
        return Ok(None);
    }

    let mut listing = courses.to_vec();
    let mut page = 0;
    loop {
        let pages = listing.len().div_ceil(PAGE_SIZE);
        print_course_page(&listing, page, pages);

        let Some(answer) = choices.ask("[n]ext, [p]revious, [s]earch, [q]uit, course code, or number: ")?
        else {
            return Ok(None);
        };

        match answer.to_ascii_lowercase().as_str() {
            "q" => return Ok(None),
            "n" => page = (page + 1).min(pages - 1),
            "p" => page = page.saturating_sub(1),
            "s" => {
                let Some(term) = choices.ask("Search: ")? else {
                    return Ok(None);
                };
                let matches = search_courses(&listing, &term);
                if matches.is_empty() {
                    println!("{} '{}'", "No courses match".red(), term);
                } else {
                    listing = matches;
                    page = 0;
                }
            }
            _ => match find_course(&listing, &answer) {
                Some(course) => return Ok(Some(course)),
                None => println!(
                    "{}",
                    "Enter a number, a course code (e.g. UE23CS341A) or a command".red()
                ),
            },
        }
    }
}

fn print_course_page(courses: &[Course], page: usize, pages: usize) {
    let start = page * PAGE_SIZE;
    let end = (start + PAGE_SIZE).min(courses.len());
    println!();
    for (i, course) in courses.iter().enumerate().take(end).skip(start) {
        println!("{:3}. {:<20} {}", i + 1, course.code.yellow(), course.name);
    }
    println!("{}", format!("Page {}/{}", page + 1, pages).cyan());
}

/// Parse `all`, `1,3` or `1-3` into sorted, de-duplicated unit numbers
pub fn parse_unit_selection(input: &str, count: usize) -> Result<Vec<usize>> {
    if input.trim().eq_ignore_ascii_case("all") {
        return Ok((1..=count).collect());
    }

    let mut picked = Vec::new();
    for token in tokens(input) {
        picked.extend(parse_range(token, 1, count)?);
    }
    finish(picked, "no units selected")
}

/// Parse `all`, portal ids (`2,3,6`, `2-4`) or kind names into resource kinds
///
/// Kinds come back in portal-id order.
pub fn parse_kind_selection(input: &str) -> Result<Vec<ResourceKind>> {
    if input.trim().eq_ignore_ascii_case("all") {
        return Ok(ResourceKind::ALL.to_vec());
    }

    let first = ResourceKind::Slides.portal_id() as usize;
    let last = ResourceKind::References.portal_id() as usize;
    let mut ids = Vec::new();
    for token in tokens(input) {
        let named = ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(token));
        match named {
            Some(kind) => ids.push(kind.portal_id() as usize),
            None => ids.extend(parse_range(token, first, last)?),
        }
    }

    let ids = finish(ids, "no resource types selected")?;
    Ok(ids
        .into_iter()
        .filter_map(|id| ResourceKind::from_portal_id(id as u8))
        .collect())
}

fn tokens(input: &str) -> impl Iterator<Item = &str> {
    input.split(',').map(str::trim).filter(|t| !t.is_empty())
}

fn parse_range(token: &str, min: usize, max: usize) -> Result<RangeInclusive<usize>> {
    let number = |s: &str| -> Result<usize> {
        let n: usize = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidSelection(format!("'{}' is not a number", s.trim())))?;
        if n < min || n > max {
            return Err(Error::InvalidSelection(format!(
                "{} is out of range ({}-{})",
                n, min, max
            )));
        }
        Ok(n)
    };

    match token.split_once('-') {
        Some((from, to)) => {
            let (from, to) = (number(from)?, number(to)?);
            if from > to {
                return Err(Error::InvalidSelection(format!("backwards range '{}'", token)));
            }
            Ok(from..=to)
        }
        None => {
            let n = number(token)?;
            Ok(n..=n)
        }
    }
}

fn finish(mut picked: Vec<usize>, empty: &str) -> Result<Vec<usize>> {
    picked.sort_unstable();
    picked.dedup();
    if picked.is_empty() {
        return Err(Error::InvalidSelection(empty.to_string()));
    }
    Ok(picked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::model::Class;
    use crate::portal::{Fetched, ListedLink};

    struct UnitsOnly(Vec<Unit>);

    impl Portal for UnitsOnly {
        fn list_courses(&mut self) -> std::result::Result<Vec<Course>, FetchError> {
            Ok(Vec::new())
        }
        fn list_units(&mut self, _: &Course) -> std::result::Result<Vec<Unit>, FetchError> {
            Ok(self.0.clone())
        }
        fn list_classes(&mut self, _: &Unit) -> std::result::Result<Vec<Class>, FetchError> {
            Ok(Vec::new())
        }
        fn list_class_resources(
            &mut self,
            _: &Unit,
            _: &Class,
            _: ResourceKind,
        ) -> std::result::Result<Vec<ListedLink>, FetchError> {
            Ok(Vec::new())
        }
        fn fetch(&mut self, url: &str) -> std::result::Result<Fetched, FetchError> {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn courses(n: usize) -> Vec<Course> {
        (1..=n)
            .map(|i| Course::new(i.to_string(), format!("UE23CS{:03} - Course {}", i, i)))
            .collect()
    }

    fn units(n: usize) -> Vec<Unit> {
        (1..=n)
            .map(|i| Unit {
                id: format!("u{}", i),
                name: format!("Unit {}", i),
                course_id: "1".to_string(),
                number: i,
            })
            .collect()
    }

    #[test]
    fn test_parse_unit_selection() {
        assert_eq!(parse_unit_selection("all", 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(parse_unit_selection("3, 1", 4).unwrap(), vec![1, 3]);
        assert_eq!(parse_unit_selection("1-3,2", 4).unwrap(), vec![1, 2, 3]);
        assert!(parse_unit_selection("5", 4).is_err());
        assert!(parse_unit_selection("3-1", 4).is_err());
        assert!(parse_unit_selection("x", 4).is_err());
        assert!(parse_unit_selection(" , ", 4).is_err());
    }

    #[test]
    fn test_parse_kind_selection() {
        assert_eq!(parse_kind_selection("all").unwrap(), ResourceKind::ALL.to_vec());
        assert_eq!(
            parse_kind_selection("6,2").unwrap(),
            vec![ResourceKind::Slides, ResourceKind::QuestionBank]
        );
        assert_eq!(
            parse_kind_selection("2-3,notes").unwrap(),
            vec![ResourceKind::Slides, ResourceKind::Notes]
        );
        assert!(parse_kind_selection("1").is_err());
        assert!(parse_kind_selection("9").is_err());
    }

    #[test]
    fn test_parse_year_choice() {
        assert_eq!(parse_year_choice(""), vec![AcademicYear::DEFAULT]);
        assert_eq!(parse_year_choice("1"), vec![AcademicYear::KNOWN[0]]);
        assert_eq!(parse_year_choice("7"), AcademicYear::KNOWN.to_vec());
        assert_eq!(parse_year_choice("nonsense"), vec![AcademicYear::DEFAULT]);
        assert_eq!(parse_year_choice("UE22"), vec![AcademicYear::KNOWN[3]]);
    }

    #[test]
    fn test_course_menu_paging_and_number() {
        let catalog = courses(25);
        let mut choices = Scripted::new(["n", "p", "n", "22"]);
        let course = choose_course(&catalog, &mut choices).unwrap().unwrap();
        assert_eq!(course.id, "22");
    }

    #[test]
    fn test_course_menu_search_and_code() {
        let mut catalog = courses(3);
        catalog.push(Course::new("99", "UE23CS342A - Compilers"));

        let mut search = Scripted::new(["s", "compil", "1"]);
        let found = choose_course(&catalog, &mut search).unwrap().unwrap();
        assert_eq!(found.code, "UE23CS342A");

        let mut by_code = Scripted::new(["bogus", "ue23cs002"]);
        let found = choose_course(&catalog, &mut by_code).unwrap().unwrap();
        assert_eq!(found.id, "2");
    }

    #[test]
    fn test_course_menu_quit_and_exhausted() {
        let catalog = courses(3);
        assert_eq!(choose_course(&catalog, &mut Scripted::new(["q"])).unwrap(), None);
        assert_eq!(choose_course(&catalog, &mut Scripted::new(Vec::<String>::new())).unwrap(), None);
    }

    #[test]
    fn test_run_selection_interactive() {
        let catalog = courses(3);
        let mut portal = UnitsOnly(units(4));
        let mut choices = Scripted::new(["2", "9", "2-3", "2,3"]);

        let selection = run_selection(&mut portal, &catalog, &mut choices, &Presets::default())
            .unwrap()
            .unwrap();
        assert_eq!(selection.course.id, "2");
        let picked: Vec<usize> = selection.units.iter().map(|u| u.number).collect();
        assert_eq!(picked, vec![2, 3]);
        assert_eq!(selection.kinds, vec![ResourceKind::Slides, ResourceKind::Notes]);
        // the out-of-range unit answer was asked again
        assert_eq!(choices.prompts.len(), 4);
    }

    #[test]
    fn test_run_selection_from_presets() {
        let catalog = courses(3);
        let mut portal = UnitsOnly(units(2));
        let presets = Presets {
            year: None,
            course: Some("UE23CS003".to_string()),
            units: Some("all".to_string()),
            kinds: Some("2".to_string()),
        };
        let mut choices = Scripted::default();

        let selection = run_selection(&mut portal, &catalog, &mut choices, &presets)
            .unwrap()
            .unwrap();
        assert_eq!(selection.course.id, "3");
        assert_eq!(selection.units.len(), 2);
        assert!(choices.prompts.is_empty());

        let bad = Presets {
            course: Some("UE99XX000".to_string()),
            ..Presets::default()
        };
        assert!(matches!(
            run_selection(&mut portal, &catalog, &mut choices, &bad),
            Err(Error::InvalidSelection(_))
        ));
    }

    #[test]
    fn test_choose_years_prefers_preset() {
        let mut choices = Scripted::new(["5"]);
        let presets = Presets {
            year: Some("UE22".to_string()),
            ..Presets::default()
        };
        let years = choose_years(&mut choices, &presets).unwrap();
        assert_eq!(years, vec![AcademicYear::parse("UE22").unwrap()]);
        assert!(choices.prompts.is_empty());

        let everything = Presets {
            year: Some("all".to_string()),
            ..Presets::default()
        };
        assert_eq!(
            choose_years(&mut choices, &everything).unwrap(),
            AcademicYear::KNOWN.to_vec()
        );

        let unknown = Presets {
            year: Some("next year".to_string()),
            ..Presets::default()
        };
        assert!(matches!(
            choose_years(&mut choices, &unknown),
            Err(Error::InvalidSelection(_))
        ));

        // Without a preset the menu is asked
        let years = choose_years(&mut choices, &Presets::default()).unwrap();
        assert_eq!(years.len(), 1);
        assert_eq!(choices.prompts.len(), 1);
    }
}
