use crate::domain::model::{BusinessLogic, Prompt, ProgramType};
use std::fmt::Write;

const EXTRACTION_SYSTEM: &str = "\
You are an expert IDMS/COBOL program business logic extraction specialist.
Your task is to provide an extremely detailed, comprehensive business logic
extraction that covers all critical aspects of the program.

Extraction Guidelines:
1. Provide a clear, concise program purpose statement, with minimum 150 words
2. Extract core business rules with deep, actionable details
3. Capture comprehensive data validation rules
4. Identify all special processing rules
5. Outline all integration points
6. Describe screen flow logic (for online programs)

Extraction Depth Requirements:
- Each section must be richly detailed
- Provide context and rationale behind rules
- Include specific conditions and exceptions
- Capture business logic nuances
- Ensure at least 2 pages of comprehensive documentation

Specific Focus Areas:
- Business intent behind each rule
- Validation constraints and their purposes
- Exceptional handling scenarios
- Interdependencies between different program components
";

const EXTRACTION_ONLINE: &str = "
For Online/Interactive Programs:
- Detailed screen navigation logic
- User interaction workflows
- Input validation mechanisms
- Error handling and user guidance
- Screen-to-database interaction patterns
";

const EXTRACTION_BATCH: &str = "
For Batch/Database Programs:
- Comprehensive data processing workflows
- Batch processing rules and logic
- Data transformation mechanisms
- Error handling and logging
- Database interaction patterns
";

// 輸出格式需配合 extraction 模組的段落標題
const EXTRACTION_OUTPUT: &str = "
Extraction Output Requirements:
- Structured, readable format using these section headings:
  Program Name, Program Purpose, Core Business Rules, Data Validation Rules,
  Special Processing Rules, Integration Points, Screen Flow Logic,
  Error Handling, Conclusion
- Number the items of each section (1. **Title:** details)
- Minimum 2 pages of detailed documentation
- Clear, professional language
- Technical yet business-focused description
- Include all significant program logic components
";

const VALIDATION_SYSTEM: &str = "\
You are an expert IDMS/COBOL program business logic validation specialist.

Validation Objectives:
1. Thoroughly review the extracted business logic
2. Identify potential inconsistencies or gaps
3. Provide comprehensive validation insights
4. Ensure logic completeness and accuracy

Validation Criteria:
- Verify logical consistency across all components
- Check comprehensiveness of business rules
- Validate integration point descriptions
- Ensure special case handling is robust
";

const VALIDATION_ONLINE: &str = "
For Online/Interactive Programs:
- Validate screen interaction logic
- Verify user flow completeness
- Check input validation mechanisms
- Ensure comprehensive error handling
";

const VALIDATION_BATCH: &str = "
For Batch/Database Programs:
- Validate data processing workflows
- Check record handling logic
- Verify batch processing rules
- Ensure comprehensive error and exception handling
";

const TEST_SCRIPT_SYSTEM: &str = "\
You are a test engineer creating comprehensive test scripts for an IDMS/COBOL program.

Generate at least 5 detailed test cases with the following format for EACH test case:

Test ID: PROGRAM-TC-001
Test Objective: Brief description of what's being tested
Preconditions:
1. First precondition
2. Second precondition

Test Steps:
1. First step
2. Second step
3. Third step

Expected Results:
- First expected result
- Second expected result

IMPORTANT: Follow this exact format for each test case to ensure proper parsing.
Make sure each test case has a unique Test ID, clear steps, and expected results.
";

const STRICT_TEST_SCRIPT_SYSTEM: &str = "\
Generate exactly 5 test cases for an IDMS program using this precise format:

Test ID: PROG-TC-001
Test Objective: What the test verifies
Preconditions:
1. Condition one
2. Condition two

Test Steps:
1. Step one
2. Step two
3. Step three

Expected Results:
- Result one
- Result two

REPEAT this pattern exactly 5 times with different test scenarios.
";

pub fn extraction_prompt(chunk: &str, program_type: ProgramType) -> Prompt {
    let guidance = if program_type.is_online() {
        EXTRACTION_ONLINE
    } else {
        EXTRACTION_BATCH
    };

    let user = format!(
        "Extract comprehensive business logic from the following IDMS program:\n\n\
         Program Content:\n```\n{}\n```\n\n\
         Please provide a detailed, structured business logic extraction\n\
         covering all critical aspects of the program. Ensure the extraction\n\
         is comprehensive, covering at least 2 pages of detailed documentation.\n",
        chunk
    );

    Prompt {
        system: format!("{}{}{}", EXTRACTION_SYSTEM, guidance, EXTRACTION_OUTPUT),
        user,
    }
}

pub fn validation_prompt(logic: &BusinessLogic) -> Prompt {
    let criteria = if logic.program_type.is_online() {
        VALIDATION_ONLINE
    } else {
        VALIDATION_BATCH
    };

    let user = format!(
        "Validate the following business logic extraction:\n\n\
         Program Name: {}\n\
         Program Type: {}\n\
         Program Purpose: {}\n\n\
         Core Business Rules: {}\n\
         Validations: {}\n\
         Special Cases: {}\n\
         Integration Points: {}\n\n\
         Provide a comprehensive validation that:\n\
         1. Verifies the completeness of each logic component\n\
         2. Identifies potential improvements\n\
         3. Ensures logical consistency\n\
         4. Validates alignment with program type and purpose\n",
        logic.program_name,
        logic.program_type,
        logic.program_purpose,
        logic.core_rules.len(),
        logic.validations.len(),
        logic.special_cases.len(),
        logic.integration_points.len(),
    );

    Prompt {
        system: format!("{}{}", VALIDATION_SYSTEM, criteria),
        user,
    }
}

pub fn test_script_prompt(logic: &BusinessLogic) -> Prompt {
    let mut user = format!(
        "Create a comprehensive test script for this program:\n\n\
         Program Name: {}\n\
         Program Type: {}\n\
         Purpose: {}\n\n\
         Key business rules:\n",
        logic.program_name, logic.program_type, logic.program_purpose
    );

    if logic.core_rules.is_empty() {
        user.push_str("- No specific core rules identified\n");
    } else {
        for rule in logic.core_rules.iter().take(3) {
            let _ = writeln!(user, "- {}: {}", rule.rule_id, rule.description);
        }
        if logic.core_rules.len() > 3 {
            let _ = writeln!(user, "- Plus {} more rules", logic.core_rules.len() - 3);
        }
    }

    user.push_str(
        "\nInclude test cases for:\n\
         1. Basic functionality\n\
         2. Data validation\n\
         3. Error handling\n\
         4. Integration points\n\
         5. Special processing conditions\n\n\
         IMPORTANT: Format each test case exactly as shown in the system prompt with:\n\
         - Test ID\n\
         - Test Objective\n\
         - Preconditions (numbered list)\n\
         - Test Steps (numbered list)\n\
         - Expected Results (bulleted list)\n",
    );

    Prompt {
        system: TEST_SCRIPT_SYSTEM.to_string(),
        user,
    }
}

/// Second attempt when the first answer yielded too few test cases.
pub fn strict_test_script_prompt(logic: &BusinessLogic) -> Prompt {
    let user = format!(
        "Program: {}\n\
         Type: {}\n\
         Purpose: {}\n\n\
         Create 5 different test cases covering:\n\
         1. Basic functionality\n\
         2. Validation\n\
         3. Error handling\n\
         4. Edge cases\n\
         5. Integration\n\n\
         Use the EXACT format specified.\n",
        logic.program_name, logic.program_type, logic.program_purpose
    );

    Prompt {
        system: STRICT_TEST_SCRIPT_SYSTEM.to_string(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::BusinessRule;

    fn logic_with_rules(count: usize) -> BusinessLogic {
        let mut logic = BusinessLogic::new("X800DN", ProgramType::Dc, "Customer inquiry");
        for i in 1..=count {
            logic.core_rules.push(BusinessRule::new(
                Some(format!("RULE_{}", i)),
                format!("Rule number {}", i),
                "impl",
            ));
        }
        logic
    }

    #[test]
    fn test_extraction_prompt_guidance_by_program_type() {
        let online = extraction_prompt("MOVE A TO B.", ProgramType::Dc);
        assert!(online.system.contains("screen navigation logic"));
        assert!(online.user.contains("```\nMOVE A TO B.\n```"));

        let batch = extraction_prompt("MOVE A TO B.", ProgramType::Db);
        assert!(batch.system.contains("Data transformation mechanisms"));
        assert!(!batch.system.contains("screen navigation logic"));
    }

    #[test]
    fn test_validation_prompt_carries_counts() {
        let prompt = validation_prompt(&logic_with_rules(2));
        assert!(prompt.user.contains("Program Name: X800DN"));
        assert!(prompt.user.contains("Program Type: DC"));
        assert!(prompt.user.contains("Core Business Rules: 2"));
        assert!(prompt.user.contains("Validations: 0"));
        assert!(prompt.system.contains("Validate screen interaction logic"));
    }

    #[test]
    fn test_test_script_prompt_lists_first_three_rules() {
        let prompt = test_script_prompt(&logic_with_rules(5));
        assert!(prompt.user.contains("- RULE_1: Rule number 1\n"));
        assert!(prompt.user.contains("- RULE_3: Rule number 3\n"));
        assert!(!prompt.user.contains("RULE_4"));
        assert!(prompt.user.contains("- Plus 2 more rules\n"));

        let empty = test_script_prompt(&logic_with_rules(0));
        assert!(empty.user.contains("- No specific core rules identified"));
    }

    #[test]
    fn test_strict_prompt_asks_for_five_cases() {
        let prompt = strict_test_script_prompt(&logic_with_rules(0));
        assert!(prompt.system.contains("exactly 5 test cases"));
        assert!(prompt.user.contains("Program: X800DN"));
    }
}
