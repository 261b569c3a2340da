//! Shared fixtures for unit tests.

use crate::model::Song;

pub(crate) fn sample_song() -> Song {
    Song::from_yaml_str(
        r#"
id: song-1
title: Amazing Grace
artist: Traditional
current_key: G
tempo: 90
time_signature: 3/4
sections:
  - id: verse
    section_type: verse
    name: Verse 1
    content: "G C G\nAmazing grace how sweet the sound"
  - id: chorus
    section_type: chorus
    name: ""
    content: "C G D\nThat saved a wretch like me"
arrangements:
  - { id: a2, section_id: chorus, position: 2 }
  - { id: a1, section_id: verse, position: 1 }
  - { id: a3, section_id: verse, position: 3, repeat_count: 2 }
"#,
    )
    .unwrap()
}

pub(crate) fn second_song() -> Song {
    Song::from_yaml_str(
        r#"
id: song-2
title: Slash Walk
current_key: C
tempo: 120
sections:
  - id: intro
    section_type: intro
    name: Intro
    content: "[Intro]\nC/E F#m7/A"
  - id: bridge
    section_type: bridge
    name: Bridge
    content: "Am F\nHold on"
arrangements:
  - { id: b1, section_id: intro, position: 1 }
  - { id: b2, section_id: bridge, position: 2 }
"#,
    )
    .unwrap()
}

pub(crate) fn grid_song() -> Song {
    Song::from_yaml_str(
        r#"
id: song-grid
title: Grid Tune
current_key: C
tempo: 100
theme: chord_grid
sections:
  - id: head
    section_type: verse
    name: Head
    content: '[{"id":"b1","chord":"|: C . G/B .","beats":4},{"id":"b2","chord":"Am . F .","ending":{"type":"1","isStart":true,"isEnd":true}},{"id":"b3","chord":"WR","musicalSigns":{"coda":true}}]'
arrangements:
  - { id: g1, section_id: head, position: 1 }
"#,
    )
    .unwrap()
}
