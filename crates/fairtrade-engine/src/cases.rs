//! Built-in example cases for trying out the analysis.

pub struct ExampleCase {
    pub name: &'static str,
    pub description: &'static str,
}

pub static EXAMPLE_CASES: [ExampleCase; 3] = [
    ExampleCase {
        name: "하도급 대금 삭감",
        description: "A기업은 자동차 부품 제조업체로, B기업으로부터 하도급 작업을 받아왔습니다.\n\
                      최근 B기업이 갑자기 하도급 대금을 30% 삭감하겠다고 통보했고,\n\
                      계약서에는 \"원청의 요청에 따라 단가 조정 가능\"이라는 조항이 있습니다.\n\
                      A기업은 이에 반대했지만 B기업은 \"계약서에 명시되어 있다\"며 강행하려고 합니다.",
    },
    ExampleCase {
        name: "독점적 지위 남용",
        description: "대기업 C는 특정 시장에서 80% 이상의 점유율을 가지고 있습니다.\n\
                      최근 C기업이 중소기업 D에게 \"우리 제품만 사용하라\"며\n\
                      다른 업체 제품 사용을 금지하고, 이를 어길 경우 거래 중단을 위협하고 있습니다.",
    },
    ExampleCase {
        name: "불공정 거래 조건",
        description: "대기업 E는 중소기업 F와 거래하면서 다음과 같은 조건을 제시했습니다:\n\
                      - 90일 후 지급 조건 (기존 30일에서 변경)\n\
                      - 품질 보증금 20% 예치 요구\n\
                      - 계약 해지 시 30일 전 통보\n\
                      F기업은 이러한 조건들이 너무 까다롭다고 생각합니다.",
    },
];

/// Look up an example by exact name, ignoring surrounding and inner spacing.
pub fn example_case(name: &str) -> Option<&'static ExampleCase> {
    let wanted: String = name.chars().filter(|c| !c.is_whitespace()).collect();
    EXAMPLE_CASES.iter().find(|case| {
        case.name.chars().filter(|c| !c.is_whitespace()).collect::<String>() == wanted
    })
}
