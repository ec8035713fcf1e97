//! Built-in fix templates for the most common debt kinds.

use crate::issue::{IssueType, Severity};

/// Static content of one template.
#[derive(Debug)]
pub struct TemplateRecord {
    pub severity: Severity,
    pub problem_summary: &'static str,
    pub fix_summary: &'static str,
    pub before_code: &'static str,
    pub after_code: &'static str,
    pub steps: &'static [&'static str],
    pub testing_tip: &'static str,
    pub estimated_time: &'static str,
    pub references: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixTemplate {
    BareExcept,
    MissingDocstring,
    HardcodedPassword,
    LongMethod,
    MissingRequirements,
    NoTests,
}

impl FixTemplate {
    pub const ALL: [FixTemplate; 6] = [
        FixTemplate::BareExcept,
        FixTemplate::MissingDocstring,
        FixTemplate::HardcodedPassword,
        FixTemplate::LongMethod,
        FixTemplate::MissingRequirements,
        FixTemplate::NoTests,
    ];

    pub fn for_issue_type(issue_type: &IssueType) -> Option<Self> {
        match issue_type {
            IssueType::BareExcept => Some(FixTemplate::BareExcept),
            IssueType::MissingDocstring => Some(FixTemplate::MissingDocstring),
            IssueType::HardcodedPassword => Some(FixTemplate::HardcodedPassword),
            IssueType::LongMethod => Some(FixTemplate::LongMethod),
            IssueType::MissingRequirements => Some(FixTemplate::MissingRequirements),
            IssueType::NoTests => Some(FixTemplate::NoTests),
            _ => None,
        }
    }

    pub fn issue_type(&self) -> IssueType {
        match self {
            FixTemplate::BareExcept => IssueType::BareExcept,
            FixTemplate::MissingDocstring => IssueType::MissingDocstring,
            FixTemplate::HardcodedPassword => IssueType::HardcodedPassword,
            FixTemplate::LongMethod => IssueType::LongMethod,
            FixTemplate::MissingRequirements => IssueType::MissingRequirements,
            FixTemplate::NoTests => IssueType::NoTests,
        }
    }

    pub fn record(&self) -> &'static TemplateRecord {
        match self {
            FixTemplate::BareExcept => &BARE_EXCEPT,
            FixTemplate::MissingDocstring => &MISSING_DOCSTRING,
            FixTemplate::HardcodedPassword => &HARDCODED_PASSWORD,
            FixTemplate::LongMethod => &LONG_METHOD,
            FixTemplate::MissingRequirements => &MISSING_REQUIREMENTS,
            FixTemplate::NoTests => &NO_TESTS,
        }
    }
}

static BARE_EXCEPT: TemplateRecord = TemplateRecord {
    severity: Severity::Medium,
    problem_summary: "A bare `except:` catches every exception, including SystemExit and KeyboardInterrupt, and hides real bugs.",
    fix_summary: "Catch only the exception types the block actually expects.",
    before_code: r#"try:
    result = risky_operation()
except:
    pass"#,
    after_code: r#"try:
    result = risky_operation()
except ValueError as e:
    logger.error("invalid value: %s", e)
    raise
except ConnectionError as e:
    logger.warning("connection failed: %s", e)
    return None"#,
    steps: &[
        "List the exceptions `risky_operation()` can raise",
        "Replace the bare `except:` with those specific exception types",
        "Log inside each except block",
        "Decide per type whether to re-raise or handle",
        "Remove silent `pass` handlers",
    ],
    testing_tip: "Write a test that triggers each expected exception and asserts it is handled or re-raised as intended",
    estimated_time: "15-30 minutes",
    references: &[
        "https://docs.python.org/3/tutorial/errors.html",
        "https://peps.python.org/pep-0008/#programming-recommendations",
    ],
};

static MISSING_DOCSTRING: TemplateRecord = TemplateRecord {
    severity: Severity::Low,
    problem_summary: "The function has no docstring, so callers must read its body to learn what it does.",
    fix_summary: "Add a Google-style docstring covering purpose, arguments, return value and raised errors.",
    before_code: r#"def calculate_discount(price, percentage, max_discount):
    if percentage > 100:
        raise ValueError("Percentage cannot exceed 100")
    discount = price * (percentage / 100)
    return min(discount, max_discount)"#,
    after_code: r#"def calculate_discount(price: float, percentage: float, max_discount: float) -> float:
    """Calculate a capped discount for a price.

    Args:
        price: Original price.
        percentage: Discount percentage, 0-100.
        max_discount: Upper bound for the discount.

    Returns:
        The discount amount, never above max_discount.

    Raises:
        ValueError: If percentage is above 100.
    """
    if percentage > 100:
        raise ValueError("Percentage cannot exceed 100")
    discount = price * (percentage / 100)
    return min(discount, max_discount)"#,
    steps: &[
        "Write a one-line summary as the first docstring line",
        "Document every parameter",
        "Document the return value",
        "Document exceptions the function raises",
        "Add an example for non-obvious behaviour",
    ],
    testing_tip: "Run `python -m pydoc module.function` and check the docstring renders",
    estimated_time: "5-15 minutes per function",
    references: &["https://google.github.io/styleguide/pyguide.html#38-comments-and-docstrings"],
};

static HARDCODED_PASSWORD: TemplateRecord = TemplateRecord {
    severity: Severity::Critical,
    problem_summary: "A password is hardcoded in source, exposing the credential to everyone with repository access.",
    fix_summary: "Read the credential from the environment and fail fast when it is missing.",
    before_code: r#"DB_PASSWORD = "my_super_secret_password123"
connection = connect(host="localhost", password=DB_PASSWORD)"#,
    after_code: r#"import os

DB_PASSWORD = os.environ.get("DB_PASSWORD")
if not DB_PASSWORD:
    raise EnvironmentError("DB_PASSWORD is not set")

connection = connect(host="localhost", password=DB_PASSWORD)"#,
    steps: &[
        "Rotate the exposed credential first; treat it as compromised",
        "Add a `.env` file for local development and list it in .gitignore",
        "Replace the literal with `os.environ.get(\"DB_PASSWORD\")`",
        "Fail at startup when the variable is missing",
        "Use a secrets manager in production",
    ],
    testing_tip: "Run `git log -p | grep -i password` to find every commit that exposed the credential",
    estimated_time: "30-60 minutes (includes credential rotation)",
    references: &[
        "https://12factor.net/config",
        "https://owasp.org/www-community/vulnerabilities/Use_of_hard-coded_password",
    ],
};

static LONG_METHOD: TemplateRecord = TemplateRecord {
    severity: Severity::Medium,
    problem_summary: "The function is too long to understand or test in one piece.",
    fix_summary: "Extract each logical section into a small, well-named helper.",
    before_code: r#"def process_order(order_data):
    if not order_data.get("user_id"):
        raise ValueError("Missing user_id")
    if not order_data.get("items"):
        raise ValueError("No items in order")
    # ... 80 more lines of pricing, persistence and email"#,
    after_code: r#"def process_order(order_data: dict) -> Order:
    _validate_order(order_data)
    priced = _price_items(order_data["items"])
    order = _create_order(order_data["user_id"], priced)
    _send_confirmation(order)
    return order


def _validate_order(order_data: dict) -> None:
    if not order_data.get("user_id"):
        raise ValueError("Missing user_id")
    if not order_data.get("items"):
        raise ValueError("No items in order")"#,
    steps: &[
        "Mark the logical sections of the function (validation, processing, output)",
        "Move each section into a private helper with a verb-based name",
        "Pass each helper only the data it needs",
        "Unit test every extracted helper",
        "Run the existing suite against the refactored function",
    ],
    testing_tip: "Each extracted helper should have at least one focused unit test",
    estimated_time: "1-4 hours depending on complexity",
    references: &["https://refactoring.guru/extract-method"],
};

static MISSING_REQUIREMENTS: TemplateRecord = TemplateRecord {
    severity: Severity::High,
    problem_summary: "There is no requirements file, so the project cannot be installed reproducibly.",
    fix_summary: "Add a pinned requirements.txt (or pyproject.toml) and split out dev dependencies.",
    before_code: "# no requirements.txt",
    after_code: r#"# requirements.txt
requests==2.32.3
python-dotenv==1.0.1

# requirements-dev.txt
pytest==8.3.4
ruff==0.8.4"#,
    steps: &[
        "Run `pip freeze > requirements.txt` in a working environment",
        "Remove packages the project does not import",
        "Pin every version with `==`",
        "Move test and lint tools to `requirements-dev.txt`",
        "Verify with a clean virtualenv and `pip install -r requirements.txt`",
    ],
    testing_tip: "Create a fresh virtualenv and install from the file; the app should start without extra installs",
    estimated_time: "30-60 minutes",
    references: &["https://pip.pypa.io/en/stable/user_guide/#requirements-files"],
};

static NO_TESTS: TemplateRecord = TemplateRecord {
    severity: Severity::High,
    problem_summary: "The project has no tests, so regressions go unnoticed.",
    fix_summary: "Add a pytest suite that covers the most critical code paths first.",
    before_code: "# no tests/ directory",
    after_code: r#"# tests/test_core.py
import pytest
from app.core import Calculator


def test_add_happy_path():
    assert Calculator().add(2, 3) == 5


def test_add_rejects_none():
    with pytest.raises(TypeError):
        Calculator().add(None, 3)"#,
    steps: &[
        "Install pytest and pytest-cov",
        "Create a `tests/` directory at the project root",
        "Cover the most critical functions first",
        "Write a happy path, an error case and an edge case per function",
        "Run `pytest -v --cov` and add it to CI",
    ],
    testing_tip: "Use `pytest --cov --cov-report=html` to see which critical paths are still uncovered",
    estimated_time: "1-3 days for an initial suite",
    references: &["https://docs.pytest.org/en/stable/"],
};
