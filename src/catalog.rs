//! 미디어 카탈로그와 메뉴 선택
//!
//! 클라이언트가 보내는 1바이트 선택은 경계에서 바로 [`Request`]로 디코딩된다.
//! 알 수 없는 바이트는 에러가 아니라 기본 항목으로 대체된다.

use std::path::PathBuf;

use crate::HANDSHAKE_BUFFER_SIZE;

/// 업로드 요청 바이트
pub const UPLOAD_REQUEST: u8 = b'U';

/// 카탈로그 항목
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Selection {
    #[default]
    BigBuckBunny,
    SailingBoat,
    ToyTrain,
}

impl Selection {
    /// 메뉴 순서대로 나열된 전체 항목
    pub const ALL: [Selection; 3] = [
        Selection::BigBuckBunny,
        Selection::SailingBoat,
        Selection::ToyTrain,
    ];

    /// 선택 바이트 디코딩 (`'1'`, `'2'`, `'3'`)
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'1' => Some(Selection::BigBuckBunny),
            b'2' => Some(Selection::SailingBoat),
            b'3' => Some(Selection::ToyTrain),
            _ => None,
        }
    }

    /// 선택 바이트 인코딩
    pub fn as_byte(&self) -> u8 {
        match self {
            Selection::BigBuckBunny => b'1',
            Selection::SailingBoat => b'2',
            Selection::ToyTrain => b'3',
        }
    }

    /// 메뉴에 표시되는 제목
    pub fn title(&self) -> &'static str {
        match self {
            Selection::BigBuckBunny => "big buck bunny",
            Selection::SailingBoat => "Sailing Boat",
            Selection::ToyTrain => "Toy Train",
        }
    }

    /// 카탈로그 디렉터리 내 파일 이름
    pub fn file_name(&self) -> &'static str {
        match self {
            Selection::BigBuckBunny => "test.mp4",
            Selection::SailingBoat => "shipvideo.mp4",
            Selection::ToyTrain => "trainvideo.mp4",
        }
    }
}

/// 핸드쉐이크 마지막 바이트가 뜻하는 요청
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// 서버 → 클라이언트 스트리밍
    Watch(Selection),

    /// 클라이언트 → 서버 업로드
    Upload,
}

impl Request {
    /// 선택 바이트 디코딩. 인식하지 못한 값은 기본 항목 시청으로 대체된다.
    pub fn from_byte(byte: u8) -> Self {
        if byte == UPLOAD_REQUEST {
            return Request::Upload;
        }
        Request::Watch(Selection::from_byte(byte).unwrap_or_default())
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Request::Watch(selection) => selection.as_byte(),
            Request::Upload => UPLOAD_REQUEST,
        }
    }
}

/// 서버가 제공하는 파일 목록
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 선택 항목의 파일 경로
    pub fn path_for(&self, selection: Selection) -> PathBuf {
        self.root.join(selection.file_name())
    }

    /// 클라이언트에게 보낼 메뉴 텍스트
    pub fn menu_for(&self, client_id: u64) -> String {
        let mut menu = format!("Client {}: What would you like to watch? \n", client_id);
        for selection in Selection::ALL {
            menu.push_str(&format!(
                " {}: {} \n",
                selection.as_byte() as char,
                selection.title()
            ));
        }
        menu.push_str(" Enter input as number choice!");
        truncate_utf8(&mut menu, HANDSHAKE_BUFFER_SIZE);
        menu
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(".")
    }
}

fn truncate_utf8(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_bytes() {
        for selection in Selection::ALL {
            assert_eq!(Selection::from_byte(selection.as_byte()), Some(selection));
        }
        assert_eq!(Selection::from_byte(b'9'), None);
    }

    #[test]
    fn test_unknown_byte_falls_back_to_default() {
        assert_eq!(Request::from_byte(b'9'), Request::Watch(Selection::BigBuckBunny));
        assert_eq!(Request::from_byte(0), Request::Watch(Selection::default()));
        assert_eq!(Request::from_byte(b'3'), Request::Watch(Selection::ToyTrain));
        assert_eq!(Request::from_byte(b'U'), Request::Upload);
    }

    #[test]
    fn test_menu_lists_every_entry() {
        let catalog = Catalog::new("/srv/media");
        let menu = catalog.menu_for(12);

        assert!(menu.starts_with("Client 12:"));
        for selection in Selection::ALL {
            assert!(menu.contains(selection.title()));
        }
        assert!(menu.len() <= HANDSHAKE_BUFFER_SIZE);
        assert_eq!(
            catalog.path_for(Selection::SailingBoat),
            PathBuf::from("/srv/media/shipvideo.mp4")
        );
    }
}
