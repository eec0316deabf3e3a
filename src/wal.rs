use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Append-only event log backing the engine's in-memory state.
///
/// Each record is framed `[u32 len][bincode payload][u32 crc32]`, both
/// integers little-endian, `len` covering the payload alone. On replay
/// a torn or corrupt tail frame ends the scan instead of failing it,
/// which is what a crash mid-append leaves behind.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

/// No legal event comes anywhere near this; a length beyond it is a
/// corrupt frame, not a large record.
const MAX_FRAME_LEN: usize = 1 << 24;

fn open_append(path: &Path) -> io::Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

fn write_frame(out: &mut impl Write, event: &Event) -> io::Result<()> {
    let body =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    out.write_all(&(body.len() as u32).to_le_bytes())?;
    out.write_all(&body)?;
    out.write_all(&crc32fast::hash(&body).to_le_bytes())?;
    Ok(())
}

fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<Option<()>> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(Some(())),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read one frame. `Ok(None)` means a clean end of log: true EOF, a
/// torn frame, or a checksum mismatch past which nothing is trusted.
fn read_frame(reader: &mut impl Read) -> io::Result<Option<Vec<u8>>> {
    let mut word = [0u8; 4];
    if read_or_eof(reader, &mut word)?.is_none() {
        return Ok(None);
    }
    let len = u32::from_le_bytes(word) as usize;
    if len > MAX_FRAME_LEN {
        return Ok(None);
    }

    let mut body = vec![0u8; len];
    if read_or_eof(reader, &mut body)?.is_none() {
        return Ok(None);
    }
    if read_or_eof(reader, &mut word)?.is_none() {
        return Ok(None);
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&body) {
        return Ok(None);
    }
    Ok(Some(body))
}

impl Wal {
    /// Open the log at `path`, creating it if missing. Appends go to
    /// the end; existing content is untouched until compaction.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            writer: open_append(path)?,
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Buffer one event without flushing. The record is durable only
    /// after the next `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        write_frame(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush buffered records and fsync the file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    /// Append one event and fsync it immediately.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write a compacted log to a sibling temp file and fsync it. The
    /// slow half of compaction; runs before the live writer is touched.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let tmp = path.with_extension("wal.tmp");
        let mut writer = BufWriter::new(File::create(&tmp)?);
        for event in events {
            write_frame(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the temp file over the live log and reopen for append.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(self.path.with_extension("wal.tmp"), &self.path)?;
        self.writer = open_append(&self.path)?;
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Both compaction halves in one call.
    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Scan the log from the start, decoding every intact record. A
    /// missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        while let Some(body) = read_frame(&mut reader)? {
            match bincode::deserialize::<Event>(&body) {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Booking, Span};
    use ulid::Ulid;

    fn wal_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("plenum_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn write_events(path: &Path, events: &[Event]) {
        let mut wal = Wal::open(path).unwrap();
        for e in events {
            wal.append(e).unwrap();
        }
    }

    fn room_added(name: &str) -> Event {
        Event::RoomAdded {
            id: Ulid::new(),
            name: name.into(),
            active: true,
        }
    }

    fn meeting(room_id: Ulid, span: Span) -> Booking {
        Booking {
            id: Ulid::new(),
            title: "Standup".into(),
            description: None,
            span,
            room_id,
            organizer_id: Ulid::new(),
            participants: Vec::new(),
            parent_id: None,
            recurrence: None,
            created_at: 0,
        }
    }

    #[test]
    fn replay_returns_events_in_order() {
        let path = wal_file("replay_order.wal");
        let rid = Ulid::new();
        let events = vec![
            Event::RoomAdded {
                id: rid,
                name: "Ipanema".into(),
                active: true,
            },
            Event::MeetingScheduled {
                meeting: meeting(rid, Span::new(1000, 2000)),
            },
            Event::RoomRetired { id: rid },
        ];
        write_events(&path, &events);

        assert_eq!(Wal::replay(&path).unwrap(), events);
    }

    #[test]
    fn torn_tail_frame_is_dropped() {
        // Two crash shapes: the length word itself cut short, and a
        // full length word promising a body that never made it.
        let torn_length = vec![0xABu8, 0xCD];
        let mut torn_body = 64u32.to_le_bytes().to_vec();
        torn_body.extend_from_slice(&[0x41; 9]);

        for (i, tail) in [torn_length, torn_body].into_iter().enumerate() {
            let path = wal_file(&format!("torn_tail_{i}.wal"));
            let event = room_added("Leblon");
            write_events(&path, &[event.clone()]);

            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&tail).unwrap();
            drop(f);

            assert_eq!(Wal::replay(&path).unwrap(), vec![event]);
        }
    }

    #[test]
    fn missing_log_replays_empty() {
        let path = wal_file("missing.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn checksum_mismatch_ends_replay() {
        let path = wal_file("bad_crc.wal");
        let good = room_added("Flamengo");
        write_events(&path, &[good.clone()]);

        // A complete frame whose checksum is off by one bit
        let body = bincode::serialize(&room_added("Gloria")).unwrap();
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&(body.len() as u32).to_le_bytes()).unwrap();
        f.write_all(&body).unwrap();
        f.write_all(&(crc32fast::hash(&body) ^ 1).to_le_bytes()).unwrap();
        drop(f);

        assert_eq!(Wal::replay(&path).unwrap(), vec![good]);
    }

    #[test]
    fn replay_rejects_absurd_length_prefix() {
        let path = wal_file("absurd_len.wal");
        let event = room_added("Urca");
        write_events(&path, &[event.clone()]);

        // A frame whose length field claims more than any event can be
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&u32::MAX.to_le_bytes()).unwrap();
        f.write_all(&[7u8; 32]).unwrap();
        drop(f);

        assert_eq!(Wal::replay(&path).unwrap(), vec![event]);
    }

    #[test]
    fn compaction_rewrites_log_from_state() {
        let path = wal_file("compaction.wal");
        let rid = Ulid::new();
        let room = Event::RoomAdded {
            id: rid,
            name: "Copacabana".into(),
            active: true,
        };

        // Schedule/cancel churn leaves a long log behind one live room
        let mut churn = vec![room.clone()];
        for _ in 0..8 {
            let m = meeting(rid, Span::new(0, 500));
            let id = m.id;
            churn.push(Event::MeetingScheduled { meeting: m });
            churn.push(Event::MeetingCancelled { id, room_id: rid });
        }
        write_events(&path, &churn);
        let before = fs::metadata(&path).unwrap().len();

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.compact(std::slice::from_ref(&room)).unwrap();
        }

        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "log should shrink: {after} vs {before}");
        assert_eq!(Wal::replay(&path).unwrap(), vec![room]);
    }

    #[test]
    fn appends_after_compaction_survive() {
        let path = wal_file("post_compact.wal");
        let rid = Ulid::new();
        let room = Event::RoomAdded {
            id: rid,
            name: "Botafogo".into(),
            active: true,
        };
        let later = Event::MeetingScheduled {
            meeting: meeting(rid, Span::new(1000, 2000)),
        };

        let mut wal = Wal::open(&path).unwrap();
        wal.append(&room).unwrap();
        wal.compact(std::slice::from_ref(&room)).unwrap();
        wal.append(&later).unwrap();
        drop(wal);

        assert_eq!(Wal::replay(&path).unwrap(), vec![room, later]);
    }

    #[test]
    fn buffered_appends_land_on_flush() {
        let path = wal_file("buffered.wal");
        let people: Vec<Event> = (0..4)
            .map(|i| Event::PersonAdded {
                id: Ulid::new(),
                name: format!("Person {i}"),
                email: format!("person{i}@example.com"),
            })
            .collect();

        let mut wal = Wal::open(&path).unwrap();
        for e in &people {
            wal.append_buffered(e).unwrap();
        }
        assert_eq!(wal.appends_since_compact(), 4);
        wal.flush_sync().unwrap();
        drop(wal);

        assert_eq!(Wal::replay(&path).unwrap(), people);
    }
}
