use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::jobs::{ActionKind, JobCategory};
use crate::world::Body;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitRole {
    Pioneer,
    Work,
    Move,
    Transferring,
    Heal,
    Attack,
    Claim,
    None,
}

impl UnitRole {
    pub const ALL: [UnitRole; 8] = [
        Self::Pioneer,
        Self::Work,
        Self::Move,
        Self::Transferring,
        Self::Heal,
        Self::Attack,
        Self::Claim,
        Self::None,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pioneer => "pioneer",
            Self::Work => "work",
            Self::Move => "move",
            Self::Transferring => "transferring",
            Self::Heal => "heal",
            Self::Attack => "attack",
            Self::Claim => "claim",
            Self::None => "none",
        }
    }

    /// Role given to a unit seen without memory, judged by its body.
    pub fn classify(body: Body) -> Self {
        if body.claim > 0 {
            Self::Claim
        } else if body.heal > 0 {
            Self::Heal
        } else if body.attack > 0 {
            Self::Attack
        } else if body.work > 0 && body.carry > 0 {
            Self::Work
        } else if body.carry > 0 {
            Self::Transferring
        } else {
            Self::Move
        }
    }
}

impl fmt::Display for UnitRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == value)
            .ok_or_else(|| format!("unknown role '{value}'"))
    }
}

/// Which job categories a role accepts and where it turns when it runs dry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDef {
    pub jobs: Vec<JobCategory>,
    /// Secondary-job search when the primary job ran out of resources.
    pub refill: Vec<JobCategory>,
    /// Overrides of `refill` for specific primary actions.
    pub refill_by_action: BTreeMap<ActionKind, Vec<JobCategory>>,
    /// New primary-job search when no refill job is available.
    pub fallback: Vec<JobCategory>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBook {
    defs: BTreeMap<UnitRole, RoleDef>,
}

impl Default for RoleBook {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RoleBook {
    pub fn empty() -> Self {
        Self {
            defs: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        use JobCategory as C;

        let mut book = Self::empty();
        let upgrade_refill = BTreeMap::from([(ActionKind::Upgrade, vec![C::WithdrawController])]);
        book.insert(
            UnitRole::Pioneer,
            RoleDef {
                jobs: vec![C::Transfer, C::Build, C::Upgrade, C::Repair, C::Harvest],
                refill: vec![C::Withdraw, C::Harvest],
                refill_by_action: upgrade_refill.clone(),
                fallback: vec![C::Withdraw, C::Harvest],
            },
        );
        book.insert(
            UnitRole::Work,
            RoleDef {
                jobs: vec![C::Build, C::Repair, C::Upgrade, C::Harvest],
                refill: vec![C::Withdraw, C::Harvest],
                refill_by_action: upgrade_refill,
                fallback: vec![C::Withdraw, C::Harvest],
            },
        );
        book.insert(
            UnitRole::Transferring,
            RoleDef {
                jobs: vec![C::Transfer, C::TransferSource],
                refill: vec![C::Withdraw],
                refill_by_action: BTreeMap::new(),
                fallback: vec![C::Withdraw],
            },
        );
        book.insert(UnitRole::Move, simple(vec![C::Move]));
        book.insert(UnitRole::Heal, simple(vec![C::Heal]));
        book.insert(UnitRole::Attack, simple(vec![C::Attack, C::Dismantle]));
        book.insert(UnitRole::Claim, simple(vec![C::Claim]));
        book
    }

    pub fn insert(&mut self, role: UnitRole, def: RoleDef) {
        self.defs.insert(role, def);
    }

    pub fn get(&self, role: UnitRole) -> Option<&RoleDef> {
        self.defs.get(&role)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn jobs_for(&self, role: UnitRole) -> &[JobCategory] {
        self.get(role)
            .map(|def| def.jobs.as_slice())
            .unwrap_or_default()
    }

    pub fn refill_for(&self, role: UnitRole, action: ActionKind) -> &[JobCategory] {
        let Some(def) = self.get(role) else {
            return Default::default();
        };
        def.refill_by_action
            .get(&action)
            .map_or(def.refill.as_slice(), Vec::as_slice)
    }

    pub fn fallback_for(&self, role: UnitRole) -> &[JobCategory] {
        self.get(role)
            .map(|def| def.fallback.as_slice())
            .unwrap_or_default()
    }

    /// Later entries replace earlier ones role by role.
    pub fn merge(&mut self, other: RoleBook) {
        self.defs.extend(other.defs);
    }
}

fn simple(jobs: Vec<JobCategory>) -> RoleDef {
    RoleDef {
        jobs,
        ..RoleDef::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleDefErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateRoleInFile,
}

#[derive(Debug, Clone)]
pub struct RoleDefError {
    pub code: RoleDefErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for RoleDefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for RoleDefError {}

/// Loads every `*.xml` file under `dir` in sorted path order on top of an empty book.
pub fn load_role_dir(dir: &Path) -> Result<RoleBook, RoleDefError> {
    let mut files = Vec::<PathBuf>::new();
    collect_xml_files(dir, &mut files)?;
    files.sort();

    let mut book = RoleBook::empty();
    for file in files {
        book.merge(load_role_file(&file)?);
    }
    Ok(book)
}

pub fn load_role_file(path: &Path) -> Result<RoleBook, RoleDefError> {
    let raw = fs::read_to_string(path).map_err(|error| read_error(path, error))?;
    parse_roles_document(path, &raw)
}

pub fn parse_roles_document(file_path: &Path, raw: &str) -> Result<RoleBook, RoleDefError> {
    let doc = Document::parse(raw).map_err(|error| RoleDefError {
        code: RoleDefErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;

    let root = doc.root_element();
    if root.tag_name().name() != "Roles" {
        return Err(error_at_node(
            RoleDefErrorCode::InvalidRoot,
            "root element must be <Roles>".to_string(),
            file_path,
            &doc,
            root,
        ));
    }

    let mut book = RoleBook::empty();
    for child in root.children().filter(|node| node.is_element()) {
        if child.tag_name().name() != "RoleDef" {
            return Err(error_at_node(
                RoleDefErrorCode::UnknownDefType,
                format!(
                    "unsupported def type <{}>; expected <RoleDef>",
                    child.tag_name().name()
                ),
                file_path,
                &doc,
                child,
            ));
        }
        let (role, def) = parse_role_def(file_path, &doc, child)?;
        if book.get(role).is_some() {
            return Err(error_at_node(
                RoleDefErrorCode::DuplicateRoleInFile,
                format!("role '{role}' is defined twice in one file"),
                file_path,
                &doc,
                child,
            ));
        }
        book.insert(role, def);
    }
    Ok(book)
}

fn parse_role_def(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<(UnitRole, RoleDef), RoleDefError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut role: Option<UnitRole> = None;
    let mut def = RoleDef::default();

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if field_name != "refillFor" && !seen_fields.insert(field_name.clone()) {
            return Err(error_at_node(
                RoleDefErrorCode::DuplicateField,
                format!("duplicate field <{field_name}> in <RoleDef>"),
                file_path,
                doc,
                field,
            ));
        }

        match field_name.as_str() {
            "role" => {
                let value = required_text(file_path, doc, field, "role")?;
                let parsed = value.parse::<UnitRole>().map_err(|message| {
                    error_at_node(
                        RoleDefErrorCode::InvalidValue,
                        message,
                        file_path,
                        doc,
                        field,
                    )
                })?;
                role = Some(parsed);
            }
            "jobs" => def.jobs = category_list(file_path, doc, field)?,
            "refill" => def.refill = category_list(file_path, doc, field)?,
            "fallback" => def.fallback = category_list(file_path, doc, field)?,
            "refillFor" => {
                let Some(action) = field.attribute("action") else {
                    return Err(error_at_node(
                        RoleDefErrorCode::MissingField,
                        "<refillFor> requires an action attribute".to_string(),
                        file_path,
                        doc,
                        field,
                    ));
                };
                let action = action.parse::<ActionKind>().map_err(|message| {
                    error_at_node(
                        RoleDefErrorCode::InvalidValue,
                        message,
                        file_path,
                        doc,
                        field,
                    )
                })?;
                let categories = category_list(file_path, doc, field)?;
                def.refill_by_action.insert(action, categories);
            }
            _ => {
                return Err(error_at_node(
                    RoleDefErrorCode::UnknownField,
                    format!("unknown field <{field_name}> in <RoleDef>"),
                    file_path,
                    doc,
                    field,
                ))
            }
        }
    }

    let Some(role) = role else {
        return Err(error_at_node(
            RoleDefErrorCode::MissingField,
            "missing required field <role> in <RoleDef>".to_string(),
            file_path,
            doc,
            node,
        ));
    };
    Ok((role, def))
}

/// Comma separated categories; an empty element means an empty list.
fn category_list(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<Vec<JobCategory>, RoleDefError> {
    let text = node.text().map(str::trim).unwrap_or_default();
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<JobCategory>().map_err(|message| {
                error_at_node(
                    RoleDefErrorCode::InvalidValue,
                    message,
                    file_path,
                    doc,
                    node,
                )
            })
        })
        .collect()
}

fn required_text(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<String, RoleDefError> {
    let value = node.text().map(str::trim).unwrap_or_default().to_string();
    if value.is_empty() {
        return Err(error_at_node(
            RoleDefErrorCode::MissingField,
            format!("field <{field_name}> must not be empty"),
            file_path,
            doc,
            node,
        ));
    }
    Ok(value)
}

fn error_at_node(
    code: RoleDefErrorCode,
    message: String,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> RoleDefError {
    let pos = doc.text_pos_at(node.range().start);
    RoleDefError {
        code,
        message,
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}

fn collect_xml_files(current: &Path, files: &mut Vec<PathBuf>) -> Result<(), RoleDefError> {
    let entries = fs::read_dir(current).map_err(|error| read_error(current, error))?;
    for entry in entries {
        let path = entry.map_err(|error| read_error(current, error))?.path();
        if path.is_dir() {
            collect_xml_files(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn read_error(path: &Path, source: std::io::Error) -> RoleDefError {
    RoleDefError {
        code: RoleDefErrorCode::ReadFile,
        message: format!("failed to read role file: {source}"),
        file_path: path.to_path_buf(),
        location: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORK_ROLE: &str = r#"
<Roles>
  <RoleDef>
    <role>work</role>
    <jobs>build, upgrade</jobs>
    <refill>withdraw, harvest</refill>
    <refillFor action="upgrade">withdrawController</refillFor>
    <fallback>harvest</fallback>
  </RoleDef>
</Roles>
"#;

    #[test]
    fn parses_role_with_action_specific_refill() {
        let book = parse_roles_document(Path::new("roles.xml"), WORK_ROLE).expect("parse");
        assert_eq!(
            book.jobs_for(UnitRole::Work),
            &[JobCategory::Build, JobCategory::Upgrade]
        );
        assert_eq!(
            book.refill_for(UnitRole::Work, ActionKind::Upgrade),
            &[JobCategory::WithdrawController]
        );
        assert_eq!(
            book.refill_for(UnitRole::Work, ActionKind::Build),
            &[JobCategory::Withdraw, JobCategory::Harvest]
        );
        assert_eq!(book.fallback_for(UnitRole::Work), &[JobCategory::Harvest]);
        assert!(book.jobs_for(UnitRole::Heal).is_empty());
    }

    #[test]
    fn unknown_category_reports_location() {
        let raw = "<Roles>\n  <RoleDef>\n    <role>work</role>\n    <jobs>build, teleport</jobs>\n  </RoleDef>\n</Roles>";
        let error = parse_roles_document(Path::new("bad.xml"), raw).expect_err("invalid");
        assert_eq!(error.code, RoleDefErrorCode::InvalidValue);
        assert_eq!(error.location.map(|loc| loc.line), Some(4));
        assert!(error.to_string().contains("teleport"));
    }

    #[test]
    fn rejects_wrong_root_and_duplicate_fields() {
        let error = parse_roles_document(Path::new("a.xml"), "<Defs/>").expect_err("root");
        assert_eq!(error.code, RoleDefErrorCode::InvalidRoot);

        let raw = "<Roles><RoleDef><role>heal</role><role>heal</role></RoleDef></Roles>";
        let error = parse_roles_document(Path::new("a.xml"), raw).expect_err("dup");
        assert_eq!(error.code, RoleDefErrorCode::DuplicateField);

        let raw = "<Roles><RoleDef><jobs>heal</jobs></RoleDef></Roles>";
        let error = parse_roles_document(Path::new("a.xml"), raw).expect_err("missing");
        assert_eq!(error.code, RoleDefErrorCode::MissingField);
    }

    #[test]
    fn later_files_override_earlier_roles() {
        let temp = tempfile::tempdir().expect("temp");
        fs::write(temp.path().join("a_base.xml"), WORK_ROLE).expect("write base");
        fs::write(
            temp.path().join("b_override.xml"),
            "<Roles><RoleDef><role>work</role><jobs>harvest</jobs></RoleDef></Roles>",
        )
        .expect("write override");

        let book = load_role_dir(temp.path()).expect("load");
        assert_eq!(book.jobs_for(UnitRole::Work), &[JobCategory::Harvest]);
        assert!(book.fallback_for(UnitRole::Work).is_empty());
    }

    #[test]
    fn builtin_upgrade_refill_prefers_controller_withdrawals() {
        let book = RoleBook::builtin();
        assert_eq!(
            book.refill_for(UnitRole::Pioneer, ActionKind::Upgrade),
            &[JobCategory::WithdrawController]
        );
        assert_eq!(
            book.fallback_for(UnitRole::Work),
            &[JobCategory::Withdraw, JobCategory::Harvest]
        );
        assert!(book.jobs_for(UnitRole::None).is_empty());
    }

    #[test]
    fn shipped_role_file_matches_builtin_book() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/roles/base.xml");
        let book = load_role_file(&path).expect("shipped roles");
        assert_eq!(book, RoleBook::builtin());
    }

    #[test]
    fn classify_reads_body_parts() {
        let body = Body {
            work: 2,
            carry: 1,
            ..Body::default()
        };
        assert_eq!(UnitRole::classify(body), UnitRole::Work);
        assert_eq!(
            UnitRole::classify(Body {
                heal: 1,
                ..Body::default()
            }),
            UnitRole::Heal
        );
        assert_eq!(UnitRole::classify(Body::default()), UnitRole::Move);
    }
}
